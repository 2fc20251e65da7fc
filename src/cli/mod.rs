//! Claude Code process spawning, line framing, and event classification.

mod events;
mod framer;
mod process;

pub use events::*;
pub use framer::*;
pub use process::*;
