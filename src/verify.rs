//! Verifier (§4.9): scans the index in batches, drops chunk-0 documents
//! whose file is gone or out of scope.
//!
//! Grounded in `original_source/apps/file-brain/services/crawler/verification.py`'s
//! `IndexVerifier`: count → batch-scan → collect orphans → batch-remove,
//! cancellable between batches, fetching only chunk 0 for bandwidth. The
//! per-batch accumulate-then-remove shape also mirrors the teacher's
//! `check.rs` diff-accumulation style (collect first, act after the pass).

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::path_filter::PathFilter;
use crate::search_client::SearchClient;

const BATCH_SIZE: usize = 100;

/// `(processed, orphaned_removed, errors)` of spec §4.9 step 5.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub processed: u64,
    pub orphaned_removed: u64,
    pub errors: u64,
}

/// Current file being examined, for the crawl manager's progress snapshot.
#[derive(Default)]
pub struct VerificationProgress {
    total_indexed: std::sync::atomic::AtomicU64,
    processed_count: std::sync::atomic::AtomicU64,
}

impl VerificationProgress {
    pub fn percent(&self) -> u8 {
        use std::sync::atomic::Ordering;
        let total = self.total_indexed.load(Ordering::Relaxed);
        if total == 0 {
            return 100;
        }
        let processed = self.processed_count.load(Ordering::Relaxed);
        ((100 * processed) / total).min(100) as u8
    }
}

/// Runs before discovery when `verify_index_on_crawl` is set (spec §4.10).
/// Never touches chunks whose file is still in scope.
pub fn verify(
    client: &dyn SearchClient,
    filter: &PathFilter,
    cancel: &CancellationToken,
    progress: &VerificationProgress,
) -> Result<VerificationReport> {
    use std::sync::atomic::Ordering;

    let total_count = client.count()?;
    progress.total_indexed.store(total_count, Ordering::Relaxed);

    let mut report = VerificationReport::default();
    if total_count == 0 {
        return Ok(report);
    }

    info!("verifier: starting verification of {total_count} indexed files");

    let mut offset = 0usize;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let documents = match client.scan(BATCH_SIZE, offset) {
            Ok(docs) => docs,
            Err(err) => {
                warn!("verifier: batch scan failed at offset {offset}: {err}");
                report.errors += 1;
                break;
            }
        };
        if documents.is_empty() {
            break;
        }

        let mut orphaned_paths = Vec::new();
        for doc in &documents {
            if cancel.is_cancelled() {
                break;
            }
            report.processed += 1;
            progress.processed_count.fetch_add(1, Ordering::Relaxed);

            let path = std::path::Path::new(&doc.file_path);
            let gone = !path.exists();
            let out_of_scope = !gone && !filter.is_in_scope(path);
            if gone || out_of_scope {
                debug!("verifier: orphaned entry {}", doc.file_path);
                orphaned_paths.push(doc.file_path.clone());
            }
        }

        for path in &orphaned_paths {
            match client.remove_by_path(path) {
                Ok(()) => report.orphaned_removed += 1,
                Err(err) => {
                    warn!("verifier: failed to remove orphan {path}: {err}");
                    report.errors += 1;
                }
            }
        }

        offset += documents.len();
    }

    info!(
        "verifier: done. processed={} orphaned_removed={} errors={}",
        report.processed, report.orphaned_removed, report.errors
    );
    Ok(report)
}
