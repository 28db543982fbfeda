// src/utils/logging.rs
//! Logging configuration and utilities
//!
//! This module handles logging setup for the mining engine, including:
//! - Standard logging configuration for the CLI host
//! - Benchmark-specific logging
//! - Custom log formatting
//!
//! Uses `env_logger` under the hood. The format includes the thread name,
//! since most of the interesting activity happens on named threads
//! (`mining-control`, `hash-worker-N`, `mining-stop`).

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes the logging subsystem with sensible defaults
///
/// # Configuration
/// - Logs to stdout
/// - Default log level: Info
/// - Custom timestamp, thread and module formatting
/// - Respects `RUST_LOG` environment variable if set
pub fn init_logging() {
    common_log_config().filter(None, LevelFilter::Info).init();
}

/// Like [`init_logging`] but tolerant of an already-installed logger
///
/// Embedding hosts may own the global logger themselves; in that case this
/// is a no-op instead of a panic.
pub fn try_init_logging() {
    let _ = common_log_config()
        .filter(None, LevelFilter::Info)
        .try_init();
}

/// Configures benchmark-specific logging
///
/// Defaults to Debug level when `RUST_LOG` is not set, so per-thread
/// hashrate lines show up without extra flags.
pub fn init_bench_logging() {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.parse_env("RUST_LOG");
    }

    builder.init();
}

/// Creates and configures a base logger builder with common settings
///
/// # Returns
/// Partially configured `env_logger::Builder` instance writing
/// `[<ts> <level> <module> <thread>] <message>` lines to stdout
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_seconds();
            let level = record.level();
            let module = record.module_path().unwrap_or_default();
            let thread = std::thread::current();

            writeln!(
                buf,
                "[{} {} {} {}] {}",
                ts,
                level,
                module,
                thread.name().unwrap_or("?"),
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
