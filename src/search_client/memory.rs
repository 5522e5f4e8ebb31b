//! In-memory [`SearchClient`] test double, grounded in the teacher's
//! `open_db_in_memory` pattern (a real backing store behind the same trait,
//! swapped in for tests instead of faked away).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{ChunkDocument, CollectionStats, SearchClient};
use crate::error::Result;

#[derive(Default)]
pub struct InMemorySearchClient {
    docs: Mutex<HashMap<String, ChunkDocument>>,
    ready: AtomicBool,
}

impl InMemorySearchClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchClient for InMemorySearchClient {
    fn initialize_collection(&self) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn get_doc_by_path(&self, file_path: &str) -> Result<Option<ChunkDocument>> {
        let id = super::document_id(file_path, 0);
        Ok(self.docs.lock().unwrap().get(&id).cloned())
    }

    fn index_chunk(&self, doc: &ChunkDocument) -> Result<()> {
        self.docs.lock().unwrap().insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    fn remove_by_path(&self, file_path: &str) -> Result<()> {
        self.docs.lock().unwrap().retain(|_, d| d.file_path != file_path);
        Ok(())
    }

    fn scan(&self, limit: usize, offset: usize) -> Result<Vec<ChunkDocument>> {
        let docs = self.docs.lock().unwrap();
        let mut chunk_zeros: Vec<ChunkDocument> =
            docs.values().filter(|d| d.chunk_index == 0).cloned().collect();
        chunk_zeros.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(chunk_zeros.into_iter().skip(offset).take(limit).collect())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.docs.lock().unwrap().values().filter(|d| d.chunk_index == 0).count() as u64)
    }

    fn stats(&self) -> Result<CollectionStats> {
        let docs = self.docs.lock().unwrap();
        let mut facet_by_extension = HashMap::new();
        let mut num_documents = 0u64;
        for doc in docs.values().filter(|d| d.chunk_index == 0) {
            num_documents += 1;
            *facet_by_extension.entry(doc.file_extension.clone()).or_insert(0u64) += 1;
        }
        Ok(CollectionStats {
            num_documents,
            facet_by_extension,
        })
    }

    fn clear_all(&self) -> Result<()> {
        self.docs.lock().unwrap().clear();
        Ok(())
    }
}
