//! Error types for smaq.
//!
//! Parser and backing-engine failures surface to the caller. Store, stats,
//! and build failures are recovered locally wherever possible, because a
//! full scan is always a valid substitute for an index.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SmaqError>;

#[derive(Debug, thiserror::Error)]
pub enum SmaqError {
    /// The query has the recognised shape but a required element is missing
    /// or unparseable.
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// The query does not match the single-table, single-predicate shape the
    /// accelerator recognises.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// An index artifact could not be read or decoded.
    #[error("failed to read index artifact {path}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An index artifact could not be written.
    #[error("failed to write index artifact {path}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An index build failed; no artifact was produced.
    #[error("failed to build index for {path}: {reason}")]
    Build { path: PathBuf, reason: String },

    /// The backing engine rejected or failed a statement.
    #[error("backing engine error")]
    Engine(#[from] duckdb::Error),

    /// Arrow-level failure while slicing or unioning record batches.
    #[error("arrow error")]
    Arrow(#[from] arrow::error::ArrowError),

    /// The stats document could not be persisted.
    #[error("failed to persist stats document")]
    Stats(#[source] std::io::Error),

    /// Invalid or unresolvable configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
