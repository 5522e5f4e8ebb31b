//! `CrawlOperation` (§3): the work item flowing through the dedup queue.

use std::path::PathBuf;

/// Where an operation came from. Consulted for logging only — it never
/// reorders the dedup queue's FIFO (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationSource {
    Crawl,
    Watch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Edit,
    Delete,
}

/// One unit of work. `file_path` is always absolute; `delete` operations
/// carry no size/time fields.
#[derive(Clone, Debug)]
pub struct CrawlOperation {
    pub kind: OperationKind,
    pub file_path: PathBuf,
    pub file_size: Option<u64>,
    pub modified_time_ms: Option<i64>,
    pub created_time_ms: Option<i64>,
    pub discovered_at_ms: i64,
    pub source: OperationSource,
    pub retry_count: u32,
    pub priority: i32,
}

impl CrawlOperation {
    pub fn create(
        file_path: PathBuf,
        file_size: u64,
        modified_time_ms: i64,
        created_time_ms: i64,
        discovered_at_ms: i64,
        source: OperationSource,
    ) -> Self {
        Self {
            kind: OperationKind::Create,
            file_path,
            file_size: Some(file_size),
            modified_time_ms: Some(modified_time_ms),
            created_time_ms: Some(created_time_ms),
            discovered_at_ms,
            source,
            retry_count: 0,
            priority: 0,
        }
    }

    pub fn edit(
        file_path: PathBuf,
        file_size: u64,
        modified_time_ms: i64,
        created_time_ms: i64,
        discovered_at_ms: i64,
        source: OperationSource,
    ) -> Self {
        Self {
            kind: OperationKind::Edit,
            file_path,
            file_size: Some(file_size),
            modified_time_ms: Some(modified_time_ms),
            created_time_ms: Some(created_time_ms),
            discovered_at_ms,
            source,
            retry_count: 0,
            priority: 0,
        }
    }

    pub fn delete(file_path: PathBuf, discovered_at_ms: i64, source: OperationSource) -> Self {
        Self {
            kind: OperationKind::Delete,
            file_path,
            file_size: None,
            modified_time_ms: None,
            created_time_ms: None,
            discovered_at_ms,
            source,
            retry_count: 0,
            priority: 0,
        }
    }
}

/// Dedup queue key: one pending entry per distinct path (spec §4.2, §8
/// scenario 4 — 50 bursty edits on the same path collapse to one entry).
pub fn dedup_key(op: &CrawlOperation) -> PathBuf {
    op.file_path.clone()
}
