//! End-to-end scenarios against the real discoverer, indexer, and verifier,
//! wired together the way the teacher's `db_tests.rs`/`lib_tests.rs` exercise
//! whole-pipeline behavior rather than single functions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use filecrawl::chunk::ChunkConfig;
use filecrawl::config::{InMemoryConfigRepository, WatchPath};
use filecrawl::discover::{discover, DiscoveryProgress};
use filecrawl::extract::basic::BasicStrategy;
use filecrawl::extract::Chain;
use filecrawl::indexer::{Indexer, Outcome};
use filecrawl::operation::{CrawlOperation, OperationSource};
use filecrawl::path_filter::PathFilter;
use filecrawl::queue::DedupQueue;
use filecrawl::search_client::memory::InMemorySearchClient;
use filecrawl::search_client::SearchClient;
use filecrawl::verify::{verify, VerificationProgress};

fn basic_indexer(search_client: Arc<dyn SearchClient>) -> Indexer {
    let chain = Chain::new(vec![Box::new(BasicStrategy::default())]);
    Indexer::new(chain, search_client, ChunkConfig::default(), 200)
}

fn filter_for(dir: &Path) -> PathFilter {
    let now = chrono::Utc::now();
    let row = WatchPath {
        id: 1,
        path: dir.to_path_buf(),
        enabled: true,
        include_subdirectories: true,
        is_excluded: false,
        created_at: now,
        updated_at: now,
    }
    .canonicalize()
    .unwrap();
    PathFilter::from_watch_paths(&[row])
}

#[test]
fn new_file_smaller_than_one_chunk_is_indexed_as_a_single_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.txt");
    std::fs::write(&path, "hello world").unwrap();

    let client: Arc<dyn SearchClient> = Arc::new(InMemorySearchClient::new());
    client.initialize_collection().unwrap();
    let indexer = basic_indexer(client.clone());

    let meta = std::fs::metadata(&path).unwrap();
    let op = CrawlOperation::create(path.clone(), meta.len(), 0, 0, 0, OperationSource::Crawl);
    let cancel = CancellationToken::new();

    assert_eq!(indexer.process(&op, &cancel), Outcome::Indexed);
    assert_eq!(indexer.counters().files_indexed.load(std::sync::atomic::Ordering::Relaxed), 1);

    let doc = client.get_doc_by_path(path.to_str().unwrap()).unwrap().unwrap();
    assert_eq!(doc.chunk_index, 0);
    assert_eq!(doc.chunk_total, 1);
}

#[test]
fn large_file_spans_three_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.txt");
    // chunk_size 2000, overlap 200 -> step 1800; 4000 chars needs 3 chunks.
    std::fs::write(&path, "x".repeat(4000)).unwrap();

    let client: Arc<dyn SearchClient> = Arc::new(InMemorySearchClient::new());
    client.initialize_collection().unwrap();
    let indexer = basic_indexer(client.clone());

    let meta = std::fs::metadata(&path).unwrap();
    let op = CrawlOperation::create(path.clone(), meta.len(), 0, 0, 0, OperationSource::Crawl);
    let cancel = CancellationToken::new();

    assert_eq!(indexer.process(&op, &cancel), Outcome::Indexed);
    let doc = client.get_doc_by_path(path.to_str().unwrap()).unwrap().unwrap();
    assert_eq!(doc.chunk_total, 3);
}

#[test]
fn unchanged_file_is_skipped_on_second_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stable.txt");
    std::fs::write(&path, "content that never changes").unwrap();

    let client: Arc<dyn SearchClient> = Arc::new(InMemorySearchClient::new());
    client.initialize_collection().unwrap();
    let indexer = basic_indexer(client.clone());
    let cancel = CancellationToken::new();
    let meta = std::fs::metadata(&path).unwrap();
    let op = CrawlOperation::create(path.clone(), meta.len(), 0, 0, 0, OperationSource::Crawl);

    assert_eq!(indexer.process(&op, &cancel), Outcome::Indexed);
    // Re-run on the same unchanged file: hash matches, so it is skipped and
    // no new indexChunk calls happen (spec §8 "re-running startCrawl on a
    // fully-indexed unchanged tree").
    let op2 = CrawlOperation::edit(path.clone(), meta.len(), 0, 0, 1, OperationSource::Crawl);
    assert_eq!(indexer.process(&op2, &cancel), Outcome::Skipped);
    assert_eq!(indexer.counters().files_skipped.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[test]
fn stale_create_after_delete_is_a_no_op() {
    // A create queued for a path that's gone by processing time observes
    // ENOENT and becomes a no-op: delete wins (spec §8 scenario 5).
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ghost.txt");
    std::fs::write(&path, "briefly exists").unwrap();
    let meta = std::fs::metadata(&path).unwrap();
    let stale_create = CrawlOperation::create(path.clone(), meta.len(), 0, 0, 0, OperationSource::Crawl);
    std::fs::remove_file(&path).unwrap();

    let client: Arc<dyn SearchClient> = Arc::new(InMemorySearchClient::new());
    client.initialize_collection().unwrap();
    let indexer = basic_indexer(client.clone());
    let cancel = CancellationToken::new();

    assert_eq!(indexer.process(&stale_create, &cancel), Outcome::Errored);
    assert!(client.get_doc_by_path(path.to_str().unwrap()).unwrap().is_none());
}

#[test]
fn discovery_then_indexing_covers_every_in_scope_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    std::fs::write(dir.path().join("b.txt"), "b").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub").join("c.txt"), "c").unwrap();

    let filter = filter_for(dir.path());
    let queue: DedupQueue<std::path::PathBuf, CrawlOperation> = DedupQueue::new(100);
    let cancel = CancellationToken::new();
    let progress = DiscoveryProgress::new(1);
    discover(&filter, &queue, &cancel, &progress);
    assert_eq!(progress.files_found(), 3);

    let client: Arc<dyn SearchClient> = Arc::new(InMemorySearchClient::new());
    client.initialize_collection().unwrap();
    let indexer = basic_indexer(client.clone());
    while let Some((_, op)) = queue.get_timeout(Duration::from_millis(50)) {
        indexer.process(&op, &cancel);
        queue.done();
    }

    assert_eq!(client.count().unwrap(), 3);
    assert_eq!(indexer.counters().files_indexed.load(std::sync::atomic::Ordering::Relaxed), 3);
}

#[test]
fn verifier_removes_orphans_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let kept = dir.path().join("kept.txt");
    std::fs::write(&kept, "still here").unwrap();

    let client: Arc<dyn SearchClient> = Arc::new(InMemorySearchClient::new());
    client.initialize_collection().unwrap();
    let indexer = basic_indexer(client.clone());
    let cancel = CancellationToken::new();

    let meta = std::fs::metadata(&kept).unwrap();
    indexer.process(&CrawlOperation::create(kept.clone(), meta.len(), 0, 0, 0, OperationSource::Crawl), &cancel);

    // A file that was indexed but has since been deleted from disk, with
    // nothing left referencing it in the watch-path filter.
    let gone = dir.path().join("gone.txt");
    std::fs::write(&gone, "temporary").unwrap();
    let gone_meta = std::fs::metadata(&gone).unwrap();
    indexer.process(&CrawlOperation::create(gone.clone(), gone_meta.len(), 0, 0, 0, OperationSource::Crawl), &cancel);
    std::fs::remove_file(&gone).unwrap();

    assert_eq!(client.count().unwrap(), 2);

    let filter = filter_for(dir.path());
    let progress = VerificationProgress::default();
    let first = verify(client.as_ref(), &filter, &cancel, &progress).unwrap();
    assert_eq!(first.orphaned_removed, 1);
    assert_eq!(client.count().unwrap(), 1);
    assert!(client.get_doc_by_path(kept.to_str().unwrap()).unwrap().is_some());

    let second = verify(client.as_ref(), &filter, &cancel, &progress).unwrap();
    assert_eq!(second.orphaned_removed, 0);
    assert_eq!(client.count().unwrap(), 1);
}

#[test]
fn full_manager_crawl_over_an_unchanged_tree_skips_every_file_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("one.txt"), "one").unwrap();
    std::fs::write(dir.path().join("two.txt"), "two").unwrap();

    let config: Arc<dyn filecrawl::config::ConfigRepository> =
        Arc::new(InMemoryConfigRepository::single_root(dir.path()).unwrap());
    let search_client: Arc<dyn SearchClient> = Arc::new(InMemorySearchClient::new());
    search_client.initialize_collection().unwrap();
    let chain = Chain::new(vec![Box::new(BasicStrategy::default())]);
    let indexer = Arc::new(Indexer::new(chain, search_client.clone(), ChunkConfig::default(), 200));
    let manager = Arc::new(filecrawl::crawl::CrawlManager::new(config, search_client.clone(), indexer, 2));

    assert!(manager.start_crawl(false).unwrap());
    wait_for_idle(&manager);
    let first = manager.snapshot();
    assert_eq!(first.files_indexed, 2);

    assert!(manager.start_crawl(false).unwrap());
    wait_for_idle(&manager);
    let second = manager.snapshot();
    // Counters reset at the start of each crawl: an all-unchanged rerun
    // indexes nothing and skips every file in scope.
    assert_eq!(second.files_skipped, 2);
    assert_eq!(second.files_indexed, 0);
}

fn wait_for_idle(manager: &Arc<filecrawl::crawl::CrawlManager>) {
    for _ in 0..200 {
        if manager.snapshot().phase == "idle" {
            return;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("crawl did not return to idle in time");
}
