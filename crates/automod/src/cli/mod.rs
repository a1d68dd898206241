//! Subcommand implementations.

pub mod check_config;
pub mod config;
pub mod replay;
pub mod score;
