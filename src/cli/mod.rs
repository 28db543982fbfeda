// src/cli/mod.rs
//! Command-line interface definitions
//!
//! The CLI is a reference host for the engine: it wires a console event
//! sink into the session and drives the same start/stop boundary a GUI
//! shell would.

/// Clap command and option definitions
pub mod commands;

// Re-export for cleaner imports
pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, StartOptions};
