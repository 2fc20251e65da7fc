//! JSON-file backed session store.
//!
//! Sessions live in one JSON document, newest first. The record shape
//! mirrors what the chat UI needs to restore history after a restart:
//! id, title derived from the first user message, timestamps, and the
//! ordered message list.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{SessionStore, StoreError};

/// Maximum title length derived from the first user message.
const TITLE_MAX_CHARS: usize = 30;

/// Sessions older than this are hidden from listings.
const LISTING_WINDOW_DAYS: i64 = 30;

/// Role of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Sent by the human.
    User,
    /// Produced by the assistant.
    Assistant,
}

/// One persisted message within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Unique message id.
    pub id: String,
    /// Who produced the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}

/// One persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id: provisional until the server-issued id is observed.
    pub id: String,
    /// Display title, derived from the first user message.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Working directory the conversation runs in, captured at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Ordered message history.
    pub messages: Vec<StoredMessage>,
}

/// Session store persisting to a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes the read-modify-write cycle across concurrent callers.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store backed by the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Default store location under the platform data directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("claude-chat").join("sessions.json"))
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List sessions updated within the last 30 days, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing file cannot be read or parsed.
    pub async fn sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.load().await?;
        let cutoff = Utc::now() - Duration::days(LISTING_WINDOW_DAYS);
        sessions.retain(|s| s.updated_at > cutoff);
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Fetch a single session by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing file cannot be read or parsed.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let sessions = self.load().await?;
        Ok(sessions.into_iter().find(|s| s.id == session_id))
    }

    async fn load(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source: err,
                })
            }
        };

        serde_json::from_str(&content).map_err(|err| StoreError::Parse {
            path: self.path.clone(),
            source: err,
        })
    }

    async fn save(&self, sessions: &[SessionRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::Write {
                    path: self.path.clone(),
                    source: err,
                })?;
        }

        let content = serde_json::to_string_pretty(sessions).map_err(|err| StoreError::Parse {
            path: self.path.clone(),
            source: err,
        })?;

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|err| StoreError::Write {
                path: self.path.clone(),
                source: err,
            })
    }
}

fn title_from(content: &str) -> String {
    let title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        format!("{title}...")
    } else {
        title
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn persist_user_message(
        &self,
        session_id: &str,
        content: &str,
        working_dir: Option<&Path>,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.load().await?;
        let now = Utc::now();

        let idx = match sessions.iter().position(|s| s.id == session_id) {
            Some(idx) => idx,
            None => {
                sessions.insert(
                    0,
                    SessionRecord {
                        id: session_id.to_string(),
                        title: title_from(content),
                        created_at: now,
                        updated_at: now,
                        working_dir: working_dir.map(Path::to_path_buf),
                        messages: Vec::new(),
                    },
                );
                0
            }
        };
        let session = &mut sessions[idx];

        session.messages.push(StoredMessage {
            id: format!("msg-{}", Uuid::new_v4()),
            role: MessageRole::User,
            content: content.to_string(),
            timestamp: now,
        });
        session.updated_at = now;

        // First user message doubles as the session title.
        if session
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count()
            == 1
        {
            session.title = title_from(content);
        }

        self.save(&sessions).await
    }

    async fn persist_assistant_text(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.load().await?;
        let now = Utc::now();

        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))?;

        match session
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
        {
            Some(message) => {
                message.content = content.to_string();
                message.timestamp = now;
            }
            None => session.messages.push(StoredMessage {
                id: format!("msg-{}", Uuid::new_v4()),
                role: MessageRole::Assistant,
                content: content.to_string(),
                timestamp: now,
            }),
        }
        session.updated_at = now;

        self.save(&sessions).await
    }

    async fn replace_provisional_id(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.load().await?;

        let session = sessions
            .iter_mut()
            .find(|s| s.id == old_id)
            .ok_or_else(|| StoreError::UnknownSession(old_id.to_string()))?;

        session.id = new_id.to_string();
        tracing::debug!(old_id, new_id, "Rewrote session id");

        self.save(&sessions).await
    }
}
