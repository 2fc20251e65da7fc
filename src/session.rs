//! Conversation identity with a provisional-to-real id overlay.
//!
//! A conversation gets a locally generated provisional id before the
//! CLI has said anything. The first `system` event carries the
//! server-issued id, which overlays the provisional one; the
//! provisional id itself never mutates, so collaborators holding it can
//! still correlate.

use uuid::Uuid;

/// Prefix marking locally generated ids that must never reach `--resume`.
const PROVISIONAL_PREFIX: &str = "temp-";

/// Identity of one conversation endpoint.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    provisional: String,
    real: Option<String>,
}

impl SessionHandle {
    /// Create a handle with a fresh provisional id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            provisional: format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()),
            real: None,
        }
    }

    /// Create a handle resuming a known server-issued session.
    #[must_use]
    pub fn resuming(session_id: impl Into<String>) -> Self {
        Self {
            provisional: format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()),
            real: Some(session_id.into()),
        }
    }

    /// Record a server-issued id observed on the stream.
    ///
    /// Returns the id it superseded when the effective id changed
    /// (the provisional id on first observation, or a previous real id
    /// when the CLI forked the session on resume); `None` when nothing
    /// changed.
    pub fn observe_real(&mut self, session_id: &str) -> Option<String> {
        if session_id.is_empty() {
            return None;
        }
        let previous = self.effective().to_string();
        if previous == session_id {
            return None;
        }
        self.real = Some(session_id.to_string());
        Some(previous)
    }

    /// The locally generated provisional id; stable for the handle's life.
    #[must_use]
    pub fn provisional(&self) -> &str {
        &self.provisional
    }

    /// The id to use when talking about this conversation right now.
    #[must_use]
    pub fn effective(&self) -> &str {
        self.real.as_deref().unwrap_or(&self.provisional)
    }

    /// The id to pass to `--resume`, if any. Provisional ids never qualify.
    #[must_use]
    pub fn resume_id(&self) -> Option<&str> {
        self.real.as_deref()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}
