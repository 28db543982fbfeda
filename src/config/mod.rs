// src/config/mod.rs
//! Configuration management for the mining engine
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files
//! - Generating configuration templates
//! - Validated defaults for every setting
//!
//! The configuration uses TOML format. Everything has a default, so a
//! missing file is not an error for hosts that embed the engine.

/// Core configuration implementation
///
/// Contains the [`MinerConfig`] struct that defines the engine's
/// configuration structure and behavior.
pub mod config;

// Re-export key items for easy access
pub use config::MinerConfig;

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads miner configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(MinerConfig)` - Successfully loaded configuration
/// * `Err(MinerError)` - If the file couldn't be read or parsed
pub fn load(path: impl Into<PathBuf>) -> Result<MinerConfig, MinerError> {
    MinerConfig::load(path)
}

/// Generates a commented configuration template
///
/// # Returns
/// String containing a ready-to-use TOML configuration template
pub fn generate_template() -> String {
    MinerConfig::generate_template()
}
