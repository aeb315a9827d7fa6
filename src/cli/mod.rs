//! Command-line interface for prompt-forge.
//!
//! Provides commands for enhancing prompts, inspecting and editing templates,
//! browsing the prompt history and managing presets.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
