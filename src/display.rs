//! Colored CLI display utilities for chat output.
//!
//! This module provides functions for printing colored, formatted output
//! to the terminal while a turn streams.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::store::SessionRecord;

/// Truncate a string to a maximum number of characters, adding an
/// ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else if max_chars <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_chars - 3).collect();
        format!("{kept}...")
    }
}

/// Print the user prompt being sent.
pub fn print_prompt(message: &str) {
    println!("{} {}", "[YOU]".green().bold(), message);
    let _ = io::stdout().flush();
}

/// Print the newly revealed portion of a snapshot.
///
/// Snapshots are cumulative prefixes; the caller tracks how much was
/// already printed and passes only the fresh suffix here.
pub fn print_text_delta(suffix: &str) {
    print!("{suffix}");
    let _ = io::stdout().flush();
}

/// What a new snapshot means for the text already on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotUpdate {
    /// The snapshot matches what is printed; nothing to do.
    Unchanged,
    /// The snapshot extends the printed text by this suffix.
    Extend(String),
    /// The printed text is no longer a prefix of the snapshot; restart
    /// on a fresh line with the full text.
    Restart(String),
}

/// Tracks what is on screen and prints only what each snapshot adds.
///
/// Snapshots usually extend one another, but an authoritative result
/// can replace the streamed draft wholesale mid-reveal; the draft is
/// then abandoned and the new text reprinted from scratch.
#[derive(Debug, Default)]
pub struct SnapshotPrinter {
    printed: String,
}

impl SnapshotPrinter {
    /// Create a printer with nothing on screen yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how to bring the screen up to date with `snapshot`.
    pub fn advance(&mut self, snapshot: &str) -> SnapshotUpdate {
        let update = match snapshot.strip_prefix(self.printed.as_str()) {
            Some("") => SnapshotUpdate::Unchanged,
            Some(suffix) => SnapshotUpdate::Extend(suffix.to_string()),
            None => SnapshotUpdate::Restart(snapshot.to_string()),
        };
        if update != SnapshotUpdate::Unchanged {
            self.printed = snapshot.to_string();
        }
        update
    }

    /// Apply a snapshot to the terminal.
    pub fn print(&mut self, snapshot: &str) {
        match self.advance(snapshot) {
            SnapshotUpdate::Unchanged => {}
            SnapshotUpdate::Extend(suffix) => print_text_delta(&suffix),
            SnapshotUpdate::Restart(text) => {
                println!();
                print_text_delta(&text);
            }
        }
    }
}

/// Print the server-issued session id when it replaces the provisional one.
pub fn print_session_id(session_id: &str) {
    println!(
        "{} session={}",
        "[SESSION]".blue().bold(),
        truncate(session_id, 40).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print a diagnostic line from the CLI's stderr.
pub fn print_diagnostic(text: &str) {
    eprintln!("{} {}", "[DIAG]".yellow().bold(), text.trim_end().dimmed());
    let _ = io::stderr().flush();
}

/// Print turn completion status.
pub fn print_turn_complete(is_error: bool) {
    println!();
    if is_error {
        println!("{} Turn ended with an error", "[DONE]".red().bold());
    } else {
        println!("{}", "[DONE]".blue().bold());
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stderr().flush();
}

/// Print one line of the session listing.
pub fn print_session_line(session: &SessionRecord) {
    println!(
        "{}  {}  {}",
        session.updated_at.format("%Y-%m-%d %H:%M").dimmed(),
        truncate(&session.id, 40).cyan(),
        session.title.bold()
    );
    let _ = io::stdout().flush();
}
