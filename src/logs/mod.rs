//! Log storage and query engine
//!
//! This module provides:
//! - The canonical [`Log`] record and its resource-attribute digest
//! - Structured filter and free-text query compilers
//! - SQLite persistence with resource-attribute deduplication
//! - Keyset-paginated queries, counts and volume histograms
//! - The batching buffer used by the syslog drain

pub mod buffer;
pub mod database;
pub mod filter;
pub mod model;
pub mod query;
pub mod search;

pub use buffer::DrainBuffer;
pub use database::{DbStats, LogDb};
pub use model::{digest, AttributeValue, Attributes, Log};
pub use query::{Cursor, PageRequest, SearchRequest, Volume};

use thiserror::Error;

/// Errors from the storage engine
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The backend rejected a predicate built from user-supplied query or filter text
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Filter compilation failed: {0}")]
    Compile(#[from] filter::CompileError),

    #[error("Invalid search query: {0}")]
    QueryParse(#[from] search::QueryParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
