//! Extraction chain (§4.5): archive → rich-document → basic, each strategy
//! a `canExtract`/`extract` pair with a distinguished "no-fallback" failure.
//!
//! Grounded in `original_source/apps/file-brain/services/extraction/extractor.py`'s
//! `ContentExtractor`: try each strategy in order, fall through ordinary
//! failures, stop and surface `NoFallback` failures immediately. The
//! Python original's "supported MIME but Tika failed" ->
//! `ExtractionFallbackNotAllowed` (`file_brain/services/extraction/tika_strategy.py`)
//! is re-expressed here as `ExtractError::NoFallback`.

pub mod archive;
pub mod basic;
pub mod rich_document;

use std::collections::HashMap;
use std::path::Path;

use crate::error::CrawlError;

/// Document-level and per-chunk metadata produced by a strategy. Field names
/// mirror spec §3/§6's essential + document-level metadata subset; callers
/// (the indexer) decide which fields land on chunk 0 versus every chunk.
pub type Metadata = HashMap<String, String>;

#[derive(Clone, Debug)]
pub struct Extracted {
    pub content: String,
    pub metadata: Metadata,
}

/// Two distinguished failure modes (spec §4.5): `Ordinary` tries the next
/// strategy; `NoFallback` means a strategy positively identified itself as
/// the authoritative handler and still failed, so extraction aborts for
/// this file rather than falling through.
#[derive(Debug)]
pub enum ExtractError {
    Ordinary(String),
    NoFallback(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ordinary(msg) => write!(f, "{msg}"),
            Self::NoFallback(msg) => write!(f, "{msg} (no fallback)"),
        }
    }
}

impl std::error::Error for ExtractError {}

pub trait ExtractionStrategy: Send + Sync {
    fn can_extract(&self, path: &Path) -> bool;
    fn extract(&self, path: &Path) -> Result<Extracted, ExtractError>;
}

/// Ordered list of strategies, tried in sequence. Not a tree: archive
/// recursion is achieved by an archive strategy holding its own inner
/// chain (spec §9 design note).
pub struct Chain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Chain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Default archive → rich-document → basic ordering (spec §4.5).
    pub fn default_chain<S>(rich_document: rich_document::RichDocumentStrategy<S>) -> Self
    where
        S: rich_document::RichDocumentService + Clone + Send + Sync + 'static,
    {
        let basic = basic::BasicStrategy::default();
        let inner: Vec<Box<dyn ExtractionStrategy>> =
            vec![Box::new(rich_document.clone()), Box::new(basic.clone())];
        let archive = archive::ArchiveStrategy::new(inner);
        Self::new(vec![Box::new(archive), Box::new(rich_document), Box::new(basic)])
    }

    /// Try each strategy in order; `ENOENT` fails immediately (spec §4.5).
    pub fn extract(&self, path: &Path) -> Result<Extracted, CrawlError> {
        if !path.exists() {
            return Err(CrawlError::transient_io(
                path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        let mut last_ordinary: Option<String> = None;
        for strategy in &self.strategies {
            if !strategy.can_extract(path) {
                continue;
            }
            match strategy.extract(path) {
                Ok(extracted) => return Ok(extracted),
                Err(ExtractError::NoFallback(reason)) => {
                    return Err(CrawlError::permanent(path, reason));
                }
                Err(ExtractError::Ordinary(reason)) => {
                    last_ordinary = Some(reason);
                }
            }
        }

        Err(CrawlError::permanent(
            path,
            last_ordinary.unwrap_or_else(|| "no extraction strategy available".to_string()),
        ))
    }
}
