//! Event types from Claude Code stream-json output.
//!
//! Claude Code in non-interactive mode (`-p --output-format stream-json`)
//! emits one JSON record per line. Only three record kinds matter to the
//! chat engine; everything else is tolerated and ignored.

use serde::{Deserialize, Serialize};

/// Raw wire record, tagged on the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Session bootstrap event carrying the server-issued session id.
    System {
        /// Event subtype (e.g., "init").
        #[serde(default)]
        subtype: Option<String>,
        /// Server-issued session identifier.
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Assistant message event. Each occurrence is a cumulative snapshot
    /// of one message, not an increment.
    Assistant {
        /// The assistant message payload.
        message: AssistantMessage,
    },
    /// Final result event, terminal for the turn.
    Result {
        /// Final response text, when the CLI produced one.
        #[serde(default)]
        result: Option<String>,
        /// Whether the turn ended in error.
        #[serde(default)]
        is_error: bool,
        /// Session identifier, when present.
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Catch-all for record kinds the engine does not consume.
    #[serde(other)]
    Unknown,
}

/// Assistant message payload within an `assistant` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Message id correlating snapshots of the same message.
    #[serde(default)]
    pub id: Option<String>,
    /// Content blocks in order.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A single content block within an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
    /// Catch-all for non-text blocks (tool_use and friends).
    #[serde(other)]
    Unknown,
}

/// Classified event delivered to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A `system` record carrying the session id.
    SessionStarted {
        /// Server-issued session identifier.
        session_id: String,
    },
    /// Cumulative snapshot of one assistant message's text.
    AssistantDelta {
        /// Correlation id grouping snapshots of the same message.
        message_id: String,
        /// Concatenation of all text blocks, in order.
        text: String,
    },
    /// Terminal result for the turn.
    FinalResult {
        /// Authoritative final text, when present.
        text: Option<String>,
        /// Whether the CLI flagged the result as an error.
        is_error: bool,
    },
    /// Structurally valid JSON the engine does not consume.
    Unrecognized,
}

/// Classify one complete line of stream-json output.
///
/// Returns `None` for empty or malformed lines; the wire format is
/// best-effort and noise is dropped, never surfaced as an error.
#[must_use]
pub fn classify(line: &str) -> Option<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let wire: WireEvent = match serde_json::from_str(trimmed) {
        Ok(event) => event,
        Err(err) => {
            tracing::trace!(error = %err, "Dropping unparseable line");
            return None;
        }
    };

    Some(match wire {
        WireEvent::System { session_id, .. } => match session_id {
            Some(session_id) => StreamEvent::SessionStarted { session_id },
            None => StreamEvent::Unrecognized,
        },
        WireEvent::Assistant { message } => {
            let text: String = message
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Unknown => None,
                })
                .collect();
            StreamEvent::AssistantDelta {
                message_id: message.id.unwrap_or_default(),
                text,
            }
        }
        WireEvent::Result {
            result, is_error, ..
        } => StreamEvent::FinalResult {
            text: result,
            is_error,
        },
        WireEvent::Unknown => StreamEvent::Unrecognized,
    })
}
