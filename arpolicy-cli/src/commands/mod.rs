//! CLI command handlers.

pub mod ar;
pub mod config;
pub mod simulate;
