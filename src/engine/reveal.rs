//! Paced reveal of reconciled text.
//!
//! The pacer advances a revealed-prefix length by a fixed chunk per
//! tick, independent of arrival timing, and owns the completion latch:
//! a turn finishes only when everything is revealed AND the stream has
//! ended. Both the timer tick and the stream-end notification check the
//! same latch, and the latch is set before any outcome is returned so
//! completion fires at most once no matter which site observes both
//! conditions first.

/// Outcome of one pacer tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing to do: caught up with an open stream, or already done.
    Idle,
    /// Reveal advanced; publish this prefix.
    Reveal(String),
    /// Everything revealed and the stream ended; the turn is complete.
    Complete(String),
}

/// Fixed-cadence reveal state for one turn.
#[derive(Debug)]
pub struct Pacer {
    revealed: usize,
    chunk: usize,
    completed: bool,
}

impl Pacer {
    /// Create a pacer revealing `chunk` characters per tick.
    #[must_use]
    pub fn new(chunk: usize) -> Self {
        Self {
            revealed: 0,
            chunk: chunk.max(1),
            completed: false,
        }
    }

    /// Advance one tick against the current best text.
    ///
    /// `text` is measured in characters; prefixes are cut on character
    /// boundaries. Completion is only ever reported once.
    pub fn tick(&mut self, text: &str, stream_ended: bool) -> TickOutcome {
        if self.completed {
            return TickOutcome::Idle;
        }

        let len = text.chars().count();
        if self.revealed < len {
            self.revealed = (self.revealed + self.chunk).min(len);
            return TickOutcome::Reveal(char_prefix(text, self.revealed));
        }

        if stream_ended {
            self.completed = true;
            return TickOutcome::Complete(text.to_string());
        }

        TickOutcome::Idle
    }

    /// Completion check for the stream-end trigger site.
    ///
    /// Returns the full text exactly once when the reveal has already
    /// caught up and the stream has ended; otherwise the next tick will
    /// get there.
    pub fn complete_if_caught_up(&mut self, text: &str, stream_ended: bool) -> Option<String> {
        if self.completed || !stream_ended {
            return None;
        }
        if self.revealed >= text.chars().count() {
            self.completed = true;
            return Some(text.to_string());
        }
        None
    }

    /// Abort fast path: force-reveal everything and latch completion.
    ///
    /// Returns the full text, or `None` if completion already fired.
    pub fn finish_now(&mut self, text: &str) -> Option<String> {
        if self.completed {
            return None;
        }
        self.completed = true;
        self.revealed = text.chars().count();
        Some(text.to_string())
    }

    /// Number of characters revealed so far.
    #[must_use]
    pub fn revealed(&self) -> usize {
        self.revealed
    }

    /// Whether completion has fired.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }
}

/// Prefix of `text` holding the first `n` characters.
fn char_prefix(text: &str, n: usize) -> String {
    match text.char_indices().nth(n) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
