//! Claude Chat - Streaming turn reconciliation for the Claude Code CLI.

pub mod cli;
pub mod config;
pub mod display;
pub mod engine;
pub mod session;
pub mod store;
