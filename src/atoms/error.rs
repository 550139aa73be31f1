// ── Patitas Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Network, Config…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Per-record failures (Transient, MalformedExtraction) are logged and
//     skipped by the batch driver; only Config aborts a run.
//   • No variant carries secret material (API keys) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RescueError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite store backend failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Missing or invalid credentials/settings. Fatal: aborts the whole
    /// batch before any record is processed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient collaborator failure (timeout, 429/5xx after retries
    /// exhausted). The current record is skipped, the batch continues.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Model output did not match the expected grammar. The record is
    /// skipped with no store mutation.
    #[error("Malformed extraction: {0}")]
    MalformedExtraction(String),

    /// A store write failed. Writes go through all-or-nothing batches, so
    /// no partial post state is left behind.
    #[error("Store write failure: {0}")]
    StoreWrite(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl RescueError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedExtraction(msg.into())
    }

    pub fn store_write(msg: impl Into<String>) -> Self {
        Self::StoreWrite(msg.into())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations return this type.
pub type RescueResult<T> = Result<T, RescueError>;
