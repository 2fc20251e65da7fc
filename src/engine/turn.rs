//! Turn reconciliation state machine.
//!
//! A turn is one request/response exchange with the Claude process.
//! Assistant events arrive as cumulative snapshots of one message; a
//! tool-use interruption starts a new message id mid-turn, so earlier
//! fragments are committed and joined with a separator. A result event
//! carrying text supersedes everything accumulated before it.

/// Lifecycle phase of a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Created but not yet streaming.
    Idle,
    /// Receiving events from the process.
    Streaming,
    /// Stream ended; waiting for the reveal to catch up.
    Finalizing,
    /// Completion fired; the turn is finished.
    Done,
}

/// Reconciles stream events into the best-known full text of one turn.
#[derive(Debug)]
pub struct Turn {
    phase: TurnPhase,
    active_fragment_id: String,
    prior_text: String,
    current_fragment: String,
    final_text: Option<String>,
    stream_ended: bool,
    is_error: bool,
    separator: String,
}

impl Turn {
    /// Create a new idle turn with the given fragment separator.
    #[must_use]
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            phase: TurnPhase::Idle,
            active_fragment_id: String::new(),
            prior_text: String::new(),
            current_fragment: String::new(),
            final_text: None,
            stream_ended: false,
            is_error: false,
            separator: separator.into(),
        }
    }

    /// Enter `Streaming`; called when the outbound message is sent.
    pub fn start(&mut self) {
        if self.phase == TurnPhase::Idle {
            self.phase = TurnPhase::Streaming;
        }
    }

    /// Apply a cumulative assistant snapshot.
    ///
    /// A snapshot for the in-progress message replaces the current
    /// fragment text. A different message id first commits the
    /// in-progress fragment into the prior text. Snapshots with no text
    /// (tool-use only messages) are ignored.
    pub fn apply_delta(&mut self, message_id: &str, text: &str) {
        if self.phase != TurnPhase::Streaming || text.is_empty() {
            return;
        }

        if message_id != self.active_fragment_id {
            if !self.active_fragment_id.is_empty() && !self.current_fragment.is_empty() {
                self.commit_current_fragment();
            }
            self.active_fragment_id = message_id.to_string();
        }

        self.current_fragment.clear();
        self.current_fragment.push_str(text);
    }

    /// Apply the terminal result event.
    ///
    /// Literal result text is authoritative and discards accumulated
    /// deltas; an absent result synthesizes the final text from them.
    pub fn apply_final(&mut self, text: Option<String>, is_error: bool) {
        if self.stream_ended {
            return;
        }
        self.is_error = is_error;

        match text {
            Some(text) => {
                self.prior_text.clear();
                self.current_fragment.clear();
                self.final_text = Some(text);
            }
            None => {
                self.commit_current_fragment();
                self.final_text = Some(self.prior_text.clone());
            }
        }

        self.enter_finalizing();
    }

    /// Latch the end of the stream with no result event observed.
    ///
    /// Salvages whatever text accumulated. Used for process exit,
    /// error-channel diagnostics, and abort. Idempotent.
    pub fn end_stream(&mut self) {
        if self.stream_ended {
            return;
        }
        self.commit_current_fragment();
        self.final_text = Some(self.prior_text.clone());
        self.enter_finalizing();
    }

    /// Mark the turn done once the reveal has caught up.
    pub fn mark_done(&mut self) {
        self.phase = TurnPhase::Done;
    }

    /// The best-known full text at this moment.
    #[must_use]
    pub fn best_text(&self) -> String {
        if let Some(ref text) = self.final_text {
            return text.clone();
        }
        if self.prior_text.is_empty() {
            self.current_fragment.clone()
        } else if self.current_fragment.is_empty() {
            self.prior_text.clone()
        } else {
            format!(
                "{}{}{}",
                self.prior_text, self.separator, self.current_fragment
            )
        }
    }

    /// Whether the stream has ended. Once true, never reverts.
    #[must_use]
    pub fn stream_ended(&self) -> bool {
        self.stream_ended
    }

    /// Whether the result was flagged as an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    fn enter_finalizing(&mut self) {
        self.stream_ended = true;
        if self.phase != TurnPhase::Done {
            self.phase = TurnPhase::Finalizing;
        }
        tracing::debug!(is_error = self.is_error, "Turn stream ended");
    }

    fn commit_current_fragment(&mut self) {
        if self.current_fragment.is_empty() {
            return;
        }
        if !self.prior_text.is_empty() {
            self.prior_text.push_str(&self.separator);
        }
        self.prior_text.push_str(&self.current_fragment);
        self.current_fragment.clear();
    }
}
