//! Persisted configuration model (§3, §6).
//!
//! The real configuration store is a small relational store out of scope
//! for this crate (spec §1); [`ConfigRepository`] is the seam the crawl
//! manager talks to, with [`InMemoryConfigRepository`] as the in-process
//! stand-in used by the CLI and by tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured root directory, or a pruning exclusion when `is_excluded`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchPath {
    pub id: i64,
    pub path: PathBuf,
    pub enabled: bool,
    pub include_subdirectories: bool,
    pub is_excluded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WatchPath {
    /// Canonicalize and validate: path must be absolute after canonicalization,
    /// and an excluded row carries no file-type filter (nothing to validate
    /// here since this crate has no file-type filter field, kept for the
    /// invariant's documentation value).
    pub fn canonicalize(mut self) -> std::io::Result<Self> {
        self.path = self.path.canonicalize()?;
        Ok(self)
    }
}

/// Recognized setting keys (spec §3). Unknown keys are preserved in `extra`
/// but never consulted by the core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub max_file_size_mb: u64,
    pub batch_size: usize,
    pub worker_queue_size: usize,
    pub ocrmypdf_enabled: bool,
    pub verify_index_on_crawl: bool,
    pub cleanup_orphaned_files: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_file_size_mb: 200,
            batch_size: 100,
            worker_queue_size: 10_000,
            ocrmypdf_enabled: false,
            verify_index_on_crawl: true,
            cleanup_orphaned_files: true,
            extra: HashMap::new(),
        }
    }
}

/// Job type recorded in `crawler_state.crawl_job_type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    Crawl,
    Monitor,
    CrawlAndMonitor,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Monitor => "monitor",
            Self::CrawlAndMonitor => "crawl+monitor",
        }
    }
}

/// Singleton row tracking the last-known crawl (spec §3 `CrawlerState`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CrawlerStateRow {
    pub crawl_job_running: bool,
    pub crawl_job_type: Option<JobType>,
    pub crawl_job_started_at: Option<DateTime<Utc>>,
    pub monitoring_active: bool,
    pub files_discovered: u64,
    pub files_indexed: u64,
    pub files_error: u64,
    pub files_skipped: u64,
    pub files_deleted: u64,
    pub discovery_progress: u8,
    pub indexing_progress: u8,
    /// Present in the original model (`crawler_state.py`); not named by
    /// spec.md but kept since nothing excludes it (SPEC_FULL §3).
    pub last_crawl_completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Seam standing in for the out-of-scope relational configuration store.
pub trait ConfigRepository: Send + Sync {
    fn list_watch_paths(&self) -> Vec<WatchPath>;
    fn settings(&self) -> Settings;
    fn load_crawler_state(&self) -> CrawlerStateRow;
    fn save_crawler_state(&self, state: CrawlerStateRow);
}

/// In-process implementation backing the CLI and tests.
pub struct InMemoryConfigRepository {
    watch_paths: Mutex<Vec<WatchPath>>,
    settings: Mutex<Settings>,
    state: Mutex<CrawlerStateRow>,
}

impl InMemoryConfigRepository {
    pub fn new(watch_paths: Vec<WatchPath>, settings: Settings) -> Self {
        Self {
            watch_paths: Mutex::new(watch_paths),
            settings: Mutex::new(settings),
            state: Mutex::new(CrawlerStateRow::default()),
        }
    }

    /// Convenience constructor: one enabled, included root, defaults otherwise.
    pub fn single_root(root: &Path) -> std::io::Result<Self> {
        Self::single_root_with_settings(root, Settings::default())
    }

    /// Like [`InMemoryConfigRepository::single_root`], with caller-supplied
    /// settings (e.g. the CLI's `--no-verify` flag).
    pub fn single_root_with_settings(root: &Path, settings: Settings) -> std::io::Result<Self> {
        let now = Utc::now();
        let wp = WatchPath {
            id: 1,
            path: root.to_path_buf(),
            enabled: true,
            include_subdirectories: true,
            is_excluded: false,
            created_at: now,
            updated_at: now,
        }
        .canonicalize()?;
        Ok(Self::new(vec![wp], settings))
    }
}

impl ConfigRepository for InMemoryConfigRepository {
    fn list_watch_paths(&self) -> Vec<WatchPath> {
        self.watch_paths.lock().unwrap().clone()
    }

    fn settings(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }

    fn load_crawler_state(&self) -> CrawlerStateRow {
        self.state.lock().unwrap().clone()
    }

    fn save_crawler_state(&self, state: CrawlerStateRow) {
        *self.state.lock().unwrap() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_have_sane_chunk_invariant_inputs() {
        let s = Settings::default();
        assert!(s.max_file_size_mb > 0);
        assert!(s.worker_queue_size > 0);
    }

    #[test]
    fn single_root_repository_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let repo = InMemoryConfigRepository::single_root(dir.path()).unwrap();
        assert_eq!(repo.list_watch_paths().len(), 1);

        let mut state = repo.load_crawler_state();
        state.files_indexed = 5;
        repo.save_crawler_state(state);
        assert_eq!(repo.load_crawler_state().files_indexed, 5);
    }
}
