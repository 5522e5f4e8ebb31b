//! Search-engine client (§4.7): idempotent upsert/delete/scan against a
//! chunked collection in the out-of-scope external search engine.
//!
//! Grounded in `original_source/services/typesense_client.py`: the original
//! literally talks to Typesense over HTTP with a document id derived from
//! `file_path`, upsert semantics, and not-found-is-success deletes. The
//! `ChunkDocument` schema mirrors `original_source/apps/file-brain/core/typesense_schema.py`'s
//! field list, generalized from one-document-per-file to chunked documents
//! per spec §6.

pub mod http;
pub mod memory;

use serde::{Deserialize, Serialize};

/// Document id = stable digest of `(file_path, chunk_index)` (spec §6).
pub fn document_id(file_path: &str, chunk_index: u32) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_path.as_bytes());
    hasher.update(&chunk_index.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

/// One chunk as stored in the external search engine (spec §3, §6). Chunk 0
/// carries the document-level fields; every other chunk carries only the
/// essential subset (`file_path`, `chunk_index`, `chunk_total`,
/// `chunk_hash`, `content`, `file_extension`, `file_size`, `mime_type`,
/// `modified_time`) with the rest left `None`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChunkDocument {
    pub id: String,
    pub file_path: String,
    pub chunk_index: u32,
    pub chunk_total: u32,
    pub chunk_hash: String,
    pub content: String,
    pub file_extension: String,
    pub file_size: i64,
    pub mime_type: String,
    pub modified_time: i64,

    // Chunk-0-only fields.
    pub file_hash: Option<String>,
    pub created_time: Option<i64>,
    pub indexed_at: Option<i64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub language: Option<String>,
    pub producer: Option<String>,
    pub application: Option<String>,
    pub comments: Option<String>,
    pub revision: Option<String>,
    pub document_created_date: Option<String>,
    pub document_modified_date: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ChunkDocument {
    /// `chunk_index < chunk_total`, computed id (spec §3 invariant).
    pub fn new(file_path: impl Into<String>, chunk_index: u32, chunk_total: u32) -> Self {
        let file_path = file_path.into();
        assert!(chunk_index < chunk_total, "chunk_index must be < chunk_total");
        Self {
            id: document_id(&file_path, chunk_index),
            file_path,
            chunk_index,
            chunk_total,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub num_documents: u64,
    pub facet_by_extension: std::collections::HashMap<String, u64>,
}

/// Seam over the out-of-scope external search engine (spec §4.7). Every
/// operation must be safe for concurrent callers.
pub trait SearchClient: Send + Sync {
    /// Idempotent: succeed if the collection exists, otherwise create it.
    /// Retries with exponential backoff on transient errors; a
    /// concurrent-creation race (someone else won) is success. On
    /// persistent failure, the client marks itself not-ready.
    fn initialize_collection(&self) -> crate::error::Result<()>;

    fn is_ready(&self) -> bool;

    /// Chunk 0 of `file_path`, if indexed.
    fn get_doc_by_path(&self, file_path: &str) -> crate::error::Result<Option<ChunkDocument>>;

    /// Upsert a single chunk document.
    fn index_chunk(&self, doc: &ChunkDocument) -> crate::error::Result<()>;

    /// Delete every chunk of `file_path`. Not-found is success.
    fn remove_by_path(&self, file_path: &str) -> crate::error::Result<()>;

    /// Paged enumeration of chunk-0 documents, sorted by `chunk_index`.
    fn scan(&self, limit: usize, offset: usize) -> crate::error::Result<Vec<ChunkDocument>>;

    fn count(&self) -> crate::error::Result<u64>;

    fn stats(&self) -> crate::error::Result<CollectionStats>;

    /// Delete every document in the collection.
    fn clear_all(&self) -> crate::error::Result<()>;
}
