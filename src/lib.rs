//! filecrawl: desktop-local crawl engine. Discovers files under configured
//! watch paths, extracts and chunks their content, and keeps an external
//! search engine's index in sync via an initial crawl plus live filesystem
//! watching.

pub mod chunk;
pub mod config;
pub mod crawl;
pub mod discover;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod operation;
pub mod path_filter;
pub mod queue;
pub mod readiness;
pub mod search_client;
pub mod utils;
pub mod verify;
pub mod watch;

pub use config::{ConfigRepository, CrawlerStateRow, InMemoryConfigRepository, JobType, Settings, WatchPath};
pub use crawl::{CrawlManager, CrawlPhase, StatusSnapshot};
pub use error::{CrawlError, Result};
pub use operation::CrawlOperation;
pub use readiness::{Registry as ReadinessRegistry, ServiceState};
