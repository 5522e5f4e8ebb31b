//! Crate-wide error kinds.
//!
//! Mirrors the error taxonomy every component boundary is expected to
//! classify into: transient I/O, permanent per-file, component-unavailable,
//! invalid configuration, and fatal. Only [`CrawlError::Fatal`] is meant to
//! propagate out of `main`; everything else is caught at its component
//! boundary and folded into counters or the readiness registry.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("transient I/O error for {path}: {source}")]
    TransientIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("permanent error indexing {path}: {reason}")]
    PermanentPerFile { path: PathBuf, reason: String },

    #[error("{service} is not ready")]
    ComponentUnavailable { service: String },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("fatal error: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl CrawlError {
    pub fn transient_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TransientIo {
            path: path.into(),
            source,
        }
    }

    pub fn permanent(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PermanentPerFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>) -> Self {
        Self::ComponentUnavailable {
            service: service.into(),
        }
    }

    /// True for errors that should count toward `files_error` but never
    /// abort the phase they occurred in (spec §7 propagation policy).
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::TransientIo { .. } | Self::PermanentPerFile { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
