//! Command-line interface for exercise-forge.
//!
//! Provides commands for generating exercises and listing known topics.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, GenerateArgs};
