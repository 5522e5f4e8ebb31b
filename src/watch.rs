//! Monitor (§4.4): translates OS filesystem events into [`CrawlOperation`]s.
//!
//! Grounded in `other_examples/.../watcher.rs` (astrid capsule watcher) for
//! the `notify::RecommendedWatcher` + channel hand-off idiom: the OS
//! callback thread only ever sends raw events down a channel, never touches
//! the dedup queue directly. The create/modify/delete → operation mapping
//! and the existence-check races ("skip delete if the file still exists",
//! "skip modify/create if the file has vanished") are grounded in
//! `original_source/apps/file-brain/services/watcher.py`'s
//! `OperationEventHandler.handle_file_event`.

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::UNIX_EPOCH;

use log::{debug, error, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::operation::{CrawlOperation, OperationSource};
use crate::path_filter::{is_os_hidden_file, PathFilter};
use crate::queue::DedupQueue;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Owns one `notify::RecommendedWatcher` per included root and a translator
/// thread that applies the path filter and pushes into the shared dedup
/// queue. Dropping (or calling [`Monitor::stop`]) unsubscribes from the OS
/// source; already-queued operations are left in the dedup queue untouched
/// (spec §4.4 cancellation semantics).
pub struct Monitor {
    _watchers: Vec<RecommendedWatcher>,
    translator: Option<JoinHandle<()>>,
    stop_tx: mpsc::Sender<()>,
}

impl Monitor {
    /// Start watching every included root recursively. The translator
    /// thread runs until [`Monitor::stop`] is called or the struct is
    /// dropped.
    pub fn start(
        filter: PathFilter,
        queue: std::sync::Arc<DedupQueue<PathBuf, CrawlOperation>>,
    ) -> notify::Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let mut watchers = Vec::new();
        for root in filter.included_roots() {
            let tx = raw_tx.clone();
            let mut watcher = RecommendedWatcher::new(
                move |res| {
                    // Callback thread owned by `notify`; must never block.
                    let _ = tx.send(res);
                },
                notify::Config::default(),
            )?;
            watcher.watch(root, RecursiveMode::Recursive)?;
            watchers.push(watcher);
        }
        drop(raw_tx);

        let translator = thread::spawn(move || translate_loop(raw_rx, stop_rx, &filter, &queue));

        Ok(Self {
            _watchers: watchers,
            translator: Some(translator),
            stop_tx,
        })
    }

    /// Unsubscribe from the OS source and stop the translator thread.
    /// Pending queue entries are left alone.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.translator.take() {
            let _ = handle.join();
        }
    }
}

fn translate_loop(
    raw_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    stop_rx: mpsc::Receiver<()>,
    filter: &PathFilter,
    queue: &DedupQueue<PathBuf, CrawlOperation>,
) {
    loop {
        if stop_rx.try_recv().is_ok() {
            return;
        }
        match raw_rx.recv_timeout(std::time::Duration::from_millis(200)) {
            Ok(Ok(event)) => handle_event(event, filter, queue),
            Ok(Err(err)) => warn!("monitor: filesystem watcher error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn handle_event(event: notify::Event, filter: &PathFilter, queue: &DedupQueue<PathBuf, CrawlOperation>) {
    let kind = event.kind;
    for path in event.paths {
        if path.is_dir() || is_os_hidden_file(&path) || !filter.is_in_scope(&path) {
            continue;
        }
        match kind {
            EventKind::Create(_) => emit_create_or_edit(&path, queue, true),
            EventKind::Modify(_) => emit_create_or_edit(&path, queue, false),
            EventKind::Remove(_) => emit_delete(&path, queue),
            _ => {}
        }
    }
}

/// `created` / `modified` only if the file still exists: a vanished create
/// becomes a silent no-op (discovery-time races are handled the same way).
fn emit_create_or_edit(path: &std::path::Path, queue: &DedupQueue<PathBuf, CrawlOperation>, is_create: bool) {
    let meta = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return,
        Err(_) => {
            debug!("monitor: {} vanished before stat, dropping event", path.display());
            return;
        }
    };
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let created = meta
        .created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let op = if is_create {
        CrawlOperation::create(path.to_path_buf(), meta.len(), modified, created, now_ms(), OperationSource::Watch)
    } else {
        CrawlOperation::edit(path.to_path_buf(), meta.len(), modified, created, now_ms(), OperationSource::Watch)
    };
    queue.put(path.to_path_buf(), op);
}

/// Only emit `delete` if the path no longer exists — avoids a race with an
/// API-driven delete that re-creates the file immediately after.
fn emit_delete(path: &std::path::Path, queue: &DedupQueue<PathBuf, CrawlOperation>) {
    if path.exists() {
        debug!("monitor: skipping delete event for still-existing path {}", path.display());
        return;
    }
    let op = CrawlOperation::delete(path.to_path_buf(), now_ms(), OperationSource::Watch);
    queue.put(path.to_path_buf(), op);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchPath;
    use chrono::Utc;
    use std::sync::Arc;

    fn watch_path(id: i64, path: &std::path::Path) -> WatchPath {
        let now = Utc::now();
        WatchPath {
            id,
            path: path.to_path_buf(),
            enabled: true,
            include_subdirectories: true,
            is_excluded: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_event_for_existing_file_emits_create_operation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hi").unwrap();
        let filter = PathFilter::from_watch_paths(&[watch_path(1, dir.path())]);
        let queue: Arc<DedupQueue<PathBuf, CrawlOperation>> = Arc::new(DedupQueue::new(10));

        emit_create_or_edit(&file, &queue, true);

        let (_, op) = queue.get().unwrap();
        assert_eq!(op.kind, crate::operation::OperationKind::Create);
        assert_eq!(op.source, OperationSource::Watch);
        drop(filter);
    }

    #[test]
    fn delete_event_is_dropped_if_file_still_exists() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hi").unwrap();
        let queue: Arc<DedupQueue<PathBuf, CrawlOperation>> = Arc::new(DedupQueue::new(10));

        emit_delete(&file, &queue);

        assert_eq!(queue.qsize(), 0);
    }

    #[test]
    fn delete_event_is_emitted_once_file_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hi").unwrap();
        std::fs::remove_file(&file).unwrap();
        let queue: Arc<DedupQueue<PathBuf, CrawlOperation>> = Arc::new(DedupQueue::new(10));

        emit_delete(&file, &queue);

        let (_, op) = queue.get().unwrap();
        assert_eq!(op.kind, crate::operation::OperationKind::Delete);
    }

    #[test]
    fn vanished_create_is_dropped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.txt");
        let queue: Arc<DedupQueue<PathBuf, CrawlOperation>> = Arc::new(DedupQueue::new(10));

        emit_create_or_edit(&file, &queue, true);

        assert_eq!(queue.qsize(), 0);
    }
}
