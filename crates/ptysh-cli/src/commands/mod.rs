//! CLI subcommand implementations.

pub mod relay;
pub mod shell;
