//! Indexer (§4.8): one `CrawlOperation` in, `files_indexed` /
//! `files_skipped` / `files_error` / `files_deleted` out.
//!
//! Grounded directly in the teacher's `check_dir`/`nefax_dir_with_opts`
//! hash-compare-skip flow (`src/check.rs`, `src/index.rs`): fetch the prior
//! hash, compare, skip if unchanged, otherwise do the expensive work. The
//! teacher hashes with `blake3` (`engine/hashing.rs`); this crate hashes
//! with MD5 specifically, since chunk 0's `file_hash` is the compatibility
//! point with the external search engine's existing documents (spec §4.8).

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::warn;
use md5::{Digest, Md5};
use tokio_util::sync::CancellationToken;

use crate::chunk::ChunkConfig;
use crate::error::{CrawlError, Result};
use crate::extract::Chain;
use crate::operation::{CrawlOperation, OperationKind};
use crate::search_client::{ChunkDocument, SearchClient};

const HASH_READ_CHUNK_SIZE: usize = 4 * 1024;

/// What happened to one operation, for the caller's progress accounting.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Indexed,
    Skipped,
    Deleted,
    Errored,
}

/// Per-worker counters, aggregated by the crawl manager into the status
/// snapshot (spec §6's `CrawlerState` counters).
#[derive(Default)]
pub struct Counters {
    pub files_indexed: AtomicU64,
    pub files_skipped: AtomicU64,
    pub files_error: AtomicU64,
    pub files_deleted: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Indexed => &self.files_indexed,
            Outcome::Skipped => &self.files_skipped,
            Outcome::Deleted => &self.files_deleted,
            Outcome::Errored => &self.files_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter. Called at the start of a new crawl (spec §3:
    /// "counters ... reset at the start of a new crawl").
    pub fn reset(&self) {
        self.files_indexed.store(0, Ordering::Relaxed);
        self.files_skipped.store(0, Ordering::Relaxed);
        self.files_error.store(0, Ordering::Relaxed);
        self.files_deleted.store(0, Ordering::Relaxed);
    }
}

/// Processes operations against one extraction chain and one search-engine
/// client. Stateless apart from shared counters and the currently-processed
/// path exposed for status reporting (spec §4.8 "State exposed per
/// worker: `current_file`").
pub struct Indexer {
    chain: Chain,
    search_client: std::sync::Arc<dyn SearchClient>,
    chunk_config: ChunkConfig,
    max_file_size_mb: u64,
    counters: Counters,
    current_file: Mutex<Option<std::path::PathBuf>>,
}

impl Indexer {
    pub fn new(
        chain: Chain,
        search_client: std::sync::Arc<dyn SearchClient>,
        chunk_config: ChunkConfig,
        max_file_size_mb: u64,
    ) -> Self {
        Self {
            chain,
            search_client,
            chunk_config,
            max_file_size_mb,
            counters: Counters::default(),
            current_file: Mutex::new(None),
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn current_file(&self) -> Option<std::path::PathBuf> {
        self.current_file.lock().unwrap().clone()
    }

    /// Process one operation end to end. Never propagates a per-file error;
    /// the caller only needs to know what happened (spec §4.8: failures
    /// count `files_error` and do not re-enqueue automatically).
    pub fn process(&self, op: &CrawlOperation, cancel: &CancellationToken) -> Outcome {
        *self.current_file.lock().unwrap() = Some(op.file_path.clone());
        let outcome = self.process_inner(op, cancel);
        *self.current_file.lock().unwrap() = None;
        self.counters.record(&outcome);
        outcome
    }

    fn process_inner(&self, op: &CrawlOperation, cancel: &CancellationToken) -> Outcome {
        if op.kind == OperationKind::Delete {
            return match self.search_client.remove_by_path(path_key(&op.file_path)) {
                Ok(()) => Outcome::Deleted,
                Err(err) => {
                    warn!("indexer: delete failed for {}: {err}", op.file_path.display());
                    Outcome::Errored
                }
            };
        }

        match self.index_create_or_edit(op, cancel) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("indexer: {} failed for {}: {err}", op_verb(op.kind), op.file_path.display());
                Outcome::Errored
            }
        }
    }

    fn index_create_or_edit(&self, op: &CrawlOperation, cancel: &CancellationToken) -> Result<Outcome> {
        let path = &op.file_path;

        let metadata = std::fs::metadata(path).map_err(|e| CrawlError::transient_io(path, e))?;
        if !metadata.is_file() {
            return Err(CrawlError::permanent(path, "not a regular file"));
        }
        if metadata.len() > self.max_file_size_mb * 1024 * 1024 {
            return Err(CrawlError::permanent(path, "file too large"));
        }

        let new_hash = hash_file_md5(path, cancel)?;
        if cancel.is_cancelled() {
            return Err(CrawlError::permanent(path, "cancelled"));
        }

        let path_str = path_key(path);
        if let Some(existing) = self.search_client.get_doc_by_path(path_str)? {
            if existing.file_hash.as_deref() == Some(new_hash.as_str()) {
                return Ok(Outcome::Skipped);
            }
        }

        if cancel.is_cancelled() {
            return Err(CrawlError::permanent(path, "cancelled"));
        }
        let extracted = self.chain.extract(path)?;

        if cancel.is_cancelled() {
            return Err(CrawlError::permanent(path, "cancelled"));
        }
        let chunks = self.chunk_config.split(&extracted.content);
        let chunk_total = chunks.len() as u32;

        let file_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        let mime_type = extracted
            .metadata
            .get("mime_type")
            .cloned()
            .unwrap_or_else(|| mime_guess::from_path(path).first().map(|m| m.to_string()).unwrap_or_default());

        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CrawlError::permanent(path, "cancelled"));
            }
            let mut doc = ChunkDocument::new(path_str, index as u32, chunk_total);
            doc.chunk_hash = crate::chunk::chunk_hash(path_str, index as u32, &chunk.content);
            doc.content = chunk.content.clone();
            doc.file_extension = file_extension.clone();
            doc.file_size = metadata.len() as i64;
            doc.mime_type = mime_type.clone();
            doc.modified_time = op.modified_time_ms.unwrap_or_default();

            if index == 0 {
                apply_document_metadata(&mut doc, &extracted.metadata, &new_hash, op.created_time_ms);
            }

            self.search_client.index_chunk(&doc)?;
        }

        Ok(Outcome::Indexed)
    }
}

fn op_verb(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Create => "create",
        OperationKind::Edit => "edit",
        OperationKind::Delete => "delete",
    }
}

fn path_key(path: &Path) -> &str {
    path.to_str().unwrap_or_default()
}

/// Streamed MD5 over 4 KiB blocks (spec §4.8), checking cancellation
/// between reads the way the teacher's `hash_file` streams between reads
/// of `HASH_READ_CHUNK_SIZE` (`engine/hashing.rs`).
fn hash_file_md5(path: &Path, cancel: &CancellationToken) -> Result<String> {
    let file = File::open(path).map_err(|e| CrawlError::transient_io(path, e))?;
    let mut reader = std::io::BufReader::with_capacity(HASH_READ_CHUNK_SIZE, file);
    let mut buffer = vec![0u8; HASH_READ_CHUNK_SIZE];
    let mut hasher = Md5::new();

    loop {
        if cancel.is_cancelled() {
            return Err(CrawlError::permanent(path, "cancelled"));
        }
        let n = reader.read(&mut buffer).map_err(|e| CrawlError::transient_io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fills chunk 0's document-level fields from extracted metadata (spec §3,
/// §4.5 contract list). Unset keys stay `None` rather than empty strings.
fn apply_document_metadata(
    doc: &mut ChunkDocument,
    metadata: &crate::extract::Metadata,
    file_hash: &str,
    created_time_ms: Option<i64>,
) {
    doc.file_hash = Some(file_hash.to_string());
    doc.created_time = created_time_ms;
    doc.indexed_at = Some(crate::discover::now_ms());
    doc.title = metadata.get("title").cloned();
    doc.author = metadata.get("author").cloned();
    doc.description = metadata.get("description").cloned();
    doc.subject = metadata.get("subject").cloned();
    doc.language = metadata.get("language").cloned();
    doc.producer = metadata.get("producer").cloned();
    doc.application = metadata.get("application").cloned();
    doc.comments = metadata.get("comments").cloned();
    doc.revision = metadata.get("revision").cloned();
    doc.document_created_date = metadata.get("document_created_date").cloned();
    doc.document_modified_date = metadata.get("document_modified_date").cloned();
    doc.content_type = metadata.get("extraction_method").cloned();
    doc.keywords = metadata
        .get("keywords")
        .map(|k| k.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());
}
