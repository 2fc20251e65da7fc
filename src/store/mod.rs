//! Durable session storage boundary.
//!
//! The engine calls the store fire-and-forget at defined points (user
//! message sent, final assistant text committed, session id rewritten)
//! and never waits on it for forward progress. Failures are logged,
//! not propagated into the turn.

mod json_file;

pub use json_file::{JsonFileStore, MessageRole, SessionRecord, StoredMessage};

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Errors from session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading the backing file failed.
    #[error("Failed to read session store {path}: {source}")]
    Read {
        /// Store file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Writing the backing file failed.
    #[error("Failed to write session store {path}: {source}")]
    Write {
        /// Store file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The backing file holds invalid JSON.
    #[error("Failed to parse session store {path}: {source}")]
    Parse {
        /// Store file path.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// No session with the given id exists.
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

/// Persistence boundary between the engine and durable session history.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Record an outbound user message, creating the session if needed.
    ///
    /// `working_dir` is captured on the session record at creation and
    /// left alone afterwards.
    async fn persist_user_message(
        &self,
        session_id: &str,
        content: &str,
        working_dir: Option<&Path>,
    ) -> Result<(), StoreError>;

    /// Record the final assistant text for the latest exchange.
    async fn persist_assistant_text(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<(), StoreError>;

    /// Rewrite a provisional session id to the server-issued one.
    async fn replace_provisional_id(&self, old_id: &str, new_id: &str) -> Result<(), StoreError>;
}

/// Store that drops everything. For tests and `--no-store` runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl SessionStore for NullStore {
    async fn persist_user_message(
        &self,
        _session_id: &str,
        _content: &str,
        _working_dir: Option<&Path>,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn persist_assistant_text(
        &self,
        _session_id: &str,
        _content: &str,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn replace_provisional_id(&self, _old_id: &str, _new_id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
