//! HTTP-backed [`SearchClient`], grounded in
//! `original_source/services/typesense_client.py`'s `TypesenseClient`: one
//! collection, document id from `file_path`/`chunk_index`, upsert-everything
//! semantics, not-found-is-success deletes, exponential backoff on
//! `initialize_collection` (1s → 2s → 4s → 8s → 16s, matching the original's
//! `initial_backoff_seconds=1.0` doubled on each of `max_attempts=5` tries).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use log::{error, info, warn};
use serde::Deserialize;

use super::{ChunkDocument, CollectionStats, SearchClient};
use crate::error::{CrawlError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIALIZE_MAX_ATTEMPTS: u32 = 5;

pub struct HttpSearchClient {
    client: reqwest::blocking::Client,
    base_url: String,
    collection_name: String,
    ready: AtomicBool,
}

impl HttpSearchClient {
    pub fn new(base_url: impl Into<String>, collection_name: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("building the search-engine HTTP client failed");
        Self {
            client,
            base_url: base_url.into(),
            collection_name: collection_name.into(),
            ready: AtomicBool::new(false),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection_name)
    }

    fn documents_url(&self) -> String {
        format!("{}/documents", self.collection_url())
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.documents_url(), id)
    }

    fn try_collection_exists(&self) -> std::result::Result<bool, String> {
        let response = self.client.get(self.collection_url()).send().map_err(|e| e.to_string())?;
        match response.status() {
            s if s.is_success() => Ok(true),
            s if s.as_u16() == 404 => Ok(false),
            s => Err(format!("unexpected status {s} retrieving collection")),
        }
    }

    fn try_create_collection(&self) -> std::result::Result<(), String> {
        let response = self
            .client
            .post(format!("{}/collections", self.base_url))
            .json(&collection_schema(&self.collection_name))
            .send()
            .map_err(|e| e.to_string())?;
        match response.status() {
            s if s.is_success() => Ok(()),
            s if s.as_u16() == 409 => Ok(()), // concurrent creation race: success.
            s => Err(format!("unexpected status {s} creating collection")),
        }
    }
}

impl SearchClient for HttpSearchClient {
    fn initialize_collection(&self) -> Result<()> {
        let backoff_policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(16))
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        let outcome = backoff::retry(backoff_policy, || {
            attempt += 1;
            match self.try_collection_exists() {
                Ok(true) => Ok(()),
                Ok(false) => match self.try_create_collection() {
                    Ok(()) => Ok(()),
                    Err(err) if attempt >= INITIALIZE_MAX_ATTEMPTS => {
                        Err(backoff::Error::permanent(err))
                    }
                    Err(err) => {
                        warn!("search-engine: create-collection attempt {attempt} failed: {err}");
                        Err(backoff::Error::transient(err))
                    }
                },
                Err(err) if attempt >= INITIALIZE_MAX_ATTEMPTS => Err(backoff::Error::permanent(err)),
                Err(err) => {
                    warn!("search-engine: verify-collection attempt {attempt} failed: {err}");
                    Err(backoff::Error::transient(err))
                }
            }
        });

        match outcome {
            Ok(()) => {
                info!("search-engine: collection '{}' ready", self.collection_name);
                self.ready.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                error!(
                    "search-engine: failed to initialize collection '{}' after {INITIALIZE_MAX_ATTEMPTS} attempts: {err}",
                    self.collection_name
                );
                self.ready.store(false, Ordering::SeqCst);
                Err(CrawlError::unavailable("search-engine"))
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn get_doc_by_path(&self, file_path: &str) -> Result<Option<ChunkDocument>> {
        let id = super::document_id(file_path, 0);
        let response = self
            .client
            .get(self.document_url(&id))
            .send()
            .map_err(|e| CrawlError::transient_io(file_path, std::io::Error::other(e)))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CrawlError::unavailable("search-engine"));
        }
        let doc: ChunkDocument = response
            .json()
            .map_err(|e| CrawlError::transient_io(file_path, std::io::Error::other(e)))?;
        Ok(Some(doc))
    }

    fn index_chunk(&self, doc: &ChunkDocument) -> Result<()> {
        let response = self
            .client
            .post(self.documents_url())
            .query(&[("action", "upsert")])
            .json(doc)
            .send()
            .map_err(|e| CrawlError::transient_io(&doc.file_path, std::io::Error::other(e)))?;
        if !response.status().is_success() {
            return Err(CrawlError::permanent(
                &doc.file_path,
                format!("upsert failed with status {}", response.status()),
            ));
        }
        Ok(())
    }

    fn remove_by_path(&self, file_path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.documents_url())
            .query(&[("filter_by", format!("file_path:={file_path}"))])
            .send()
            .map_err(|e| CrawlError::transient_io(file_path, std::io::Error::other(e)))?;
        // Not-found is success (spec §4.7).
        if response.status().is_success() || response.status().as_u16() == 404 {
            return Ok(());
        }
        Err(CrawlError::unavailable("search-engine"))
    }

    fn scan(&self, limit: usize, offset: usize) -> Result<Vec<ChunkDocument>> {
        #[derive(Deserialize)]
        struct SearchResponse {
            hits: Vec<SearchHit>,
        }
        #[derive(Deserialize)]
        struct SearchHit {
            document: ChunkDocument,
        }

        let page = (offset / limit.max(1)) + 1;
        let response = self
            .client
            .get(self.documents_url() + "/search")
            .query(&[
                ("q", "*".to_string()),
                ("filter_by", "chunk_index:=0".to_string()),
                ("per_page", limit.to_string()),
                ("page", page.to_string()),
                ("exclude_fields", "content,embedding".to_string()),
            ])
            .send()
            .map_err(|e| CrawlError::Fatal(e.into()))?;

        if !response.status().is_success() {
            return Err(CrawlError::unavailable("search-engine"));
        }
        let parsed: SearchResponse = response.json().map_err(|e| CrawlError::Fatal(e.into()))?;
        Ok(parsed.hits.into_iter().map(|h| h.document).collect())
    }

    fn count(&self) -> Result<u64> {
        let stats = self.stats()?;
        Ok(stats.num_documents)
    }

    fn stats(&self) -> Result<CollectionStats> {
        #[derive(Deserialize)]
        struct CollectionInfo {
            num_documents: u64,
        }
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .map_err(|e| CrawlError::Fatal(e.into()))?;
        if !response.status().is_success() {
            return Err(CrawlError::unavailable("search-engine"));
        }
        let info: CollectionInfo = response.json().map_err(|e| CrawlError::Fatal(e.into()))?;
        Ok(CollectionStats {
            num_documents: info.num_documents,
            facet_by_extension: HashMap::new(),
        })
    }

    fn clear_all(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.documents_url())
            .query(&[("filter_by", "id:!=null")])
            .send()
            .map_err(|e| CrawlError::Fatal(e.into()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CrawlError::unavailable("search-engine"))
        }
    }
}

fn collection_schema(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "fields": [
            {"name": "file_path", "type": "string", "facet": false},
            {"name": "chunk_index", "type": "int32", "facet": false},
            {"name": "chunk_total", "type": "int32", "facet": false},
            {"name": "chunk_hash", "type": "string", "facet": false},
            {"name": "content", "type": "string", "facet": false},
            {"name": "file_extension", "type": "string", "facet": true},
            {"name": "file_size", "type": "int64", "facet": false},
            {"name": "mime_type", "type": "string", "facet": true},
            {"name": "modified_time", "type": "int64", "facet": false},
            {"name": "file_hash", "type": "string", "facet": false, "optional": true},
            {"name": "created_time", "type": "int64", "facet": false, "optional": true},
            {"name": "indexed_at", "type": "int64", "facet": false, "optional": true},
            {"name": "title", "type": "string", "facet": false, "optional": true},
            {"name": "author", "type": "string", "facet": true, "optional": true},
            {"name": "description", "type": "string", "facet": false, "optional": true},
            {"name": "subject", "type": "string", "facet": true, "optional": true},
            {"name": "language", "type": "string", "facet": true, "optional": true},
            {"name": "producer", "type": "string", "facet": true, "optional": true},
            {"name": "application", "type": "string", "facet": true, "optional": true},
            {"name": "comments", "type": "string", "facet": false, "optional": true},
            {"name": "revision", "type": "string", "facet": false, "optional": true},
            {"name": "document_created_date", "type": "string", "facet": false, "optional": true},
            {"name": "document_modified_date", "type": "string", "facet": false, "optional": true},
            {"name": "keywords", "type": "string[]", "facet": true, "optional": true},
            {"name": "content_type", "type": "string", "facet": true, "optional": true},
            {
                "name": "embedding",
                "type": "float[]",
                "embed": {
                    "from": ["title", "description", "subject", "keywords", "author", "content"],
                    "model_config": {"model_name": "ts/paraphrase-multilingual-mpnet-base-v2"}
                }
            }
        ],
        "default_sorting_field": "chunk_index"
    })
}
