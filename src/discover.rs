//! Discoverer (§4.3): walk included roots, emit one `create` operation per
//! live file.
//!
//! Grounded in the teacher's walk thread (`pipeline/walk.rs`,
//! `pipeline/orchestrator.rs`): a dedicated thread walks with `walkdir` and
//! stats each entry with `std::fs::metadata`, but instead of the teacher's
//! `Entry` channel it pushes [`CrawlOperation`]s into the shared dedup
//! queue. Per-root progress counters are supplemented from
//! `original_source/apps/file-brain/services/crawler/discoverer.py`'s
//! `FileDiscoverer`, which tracks `files_found` and walks one watch path at
//! a time — here split into `processed_roots`/`total_roots` so §4.10's
//! `discovery_progress` formula has something to divide.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::operation::{CrawlOperation, OperationSource};
use crate::path_filter::{is_os_hidden_file, PathFilter};
use crate::queue::DedupQueue;

/// Shared, cheaply-cloneable progress counters for the discovery phase.
/// `processed_roots`/`total_roots` feed `discovery_progress` (spec §4.10);
/// `files_found` is exposed for `files_discovered`.
#[derive(Clone, Default)]
pub struct DiscoveryProgress {
    processed_roots: Arc<AtomicUsize>,
    total_roots: Arc<AtomicUsize>,
    files_found: Arc<AtomicUsize>,
}

impl DiscoveryProgress {
    pub fn new(total_roots: usize) -> Self {
        Self {
            processed_roots: Arc::new(AtomicUsize::new(0)),
            total_roots: Arc::new(AtomicUsize::new(total_roots)),
            files_found: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn files_found(&self) -> usize {
        self.files_found.load(Ordering::Relaxed)
    }

    /// Clamped `100 * processed_roots / total_roots` (spec §4.10).
    pub fn percent(&self) -> u8 {
        let total = self.total_roots.load(Ordering::Relaxed);
        if total == 0 {
            return 100;
        }
        let processed = self.processed_roots.load(Ordering::Relaxed);
        ((100 * processed) / total).min(100) as u8
    }
}

fn to_epoch_ms(t: std::io::Result<std::time::SystemTime>) -> i64 {
    t.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub(crate) fn now_ms() -> i64 {
    to_epoch_ms(Ok(std::time::SystemTime::now()))
}

/// Walk every included root in order, pushing one `create` operation per
/// in-scope regular file into `queue`. Roots are walked sequentially so
/// files under `roots[i]` are fully emitted before `roots[i+1]` starts
/// (spec §4.3 ordering guarantee); within a root, only `walkdir`'s own
/// directory-walk order is preserved.
///
/// Cancellation is checked between directory entries and between file
/// emissions, matching the "at most one pending stat outstanding" rule.
pub fn discover(filter: &PathFilter, queue: &DedupQueue<std::path::PathBuf, CrawlOperation>, cancel: &CancellationToken, progress: &DiscoveryProgress) {
    for root in filter.included_roots() {
        if cancel.is_cancelled() {
            return;
        }
        walk_root(root, filter, queue, cancel, progress);
        progress.processed_roots.fetch_add(1, Ordering::Relaxed);
    }
}

fn walk_root(root: &Path, filter: &PathFilter, queue: &DedupQueue<std::path::PathBuf, CrawlOperation>, cancel: &CancellationToken, progress: &DiscoveryProgress) {
    debug!("discoverer: walking {}", root.display());

    let walker = WalkDir::new(root).follow_links(false).into_iter();
    // `filter_entry` lets us prune excluded subtrees without descending
    // into them, mirroring "clear the set of child directories" (spec §4.3
    // step 2) without needing `walkdir`'s lower-level API.
    let walker = walker.filter_entry(|entry| {
        let path = entry.path();
        if entry.file_type().is_dir() {
            !filter.is_pruned_dir(path)
        } else {
            true
        }
    });

    for entry in walker {
        if cancel.is_cancelled() {
            return;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.io_error().map(|e| e.kind()) == Some(std::io::ErrorKind::NotFound) {
                    debug!("discoverer: path vanished mid-walk under {}", root.display());
                } else {
                    warn!("discoverer: error walking {}: {err}", root.display());
                }
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if is_os_hidden_file(path) || !filter.is_in_scope(path) {
            continue;
        }

        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // Races with deletion mid-walk; skip silently (spec §4.3 step 3).
                continue;
            }
            Err(err) => {
                warn!("discoverer: error stating {}: {err}", path.display());
                continue;
            }
        };

        let op = CrawlOperation::create(
            path.to_path_buf(),
            meta.len(),
            to_epoch_ms(meta.modified()),
            to_epoch_ms(meta.created()),
            now_ms(),
            OperationSource::Crawl,
        );
        progress.files_found.fetch_add(1, Ordering::Relaxed);
        queue.put(path.to_path_buf(), op);

        if cancel.is_cancelled() {
            return;
        }
    }
}
