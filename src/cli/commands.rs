// src/cli/commands.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Duco Miner CLI - Duino-Coin style mining engine in Rust
#[derive(Parser, Debug)]
#[command(name = "duco-miner-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining, run a benchmark, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Start mining with the specified options
    Start(StartOptions),

    /// Run a local hashrate benchmark (no network)
    Benchmark(BenchmarkOptions),

    /// Generate a configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Username credited for accepted solutions
    pub username: String,

    /// Number of CPU cores to mine on
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub cores: usize,

    /// Worker threads per core
    #[arg(short, long, default_value_t = 1)]
    pub threads: usize,

    /// Path to a configuration file (defaults apply when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Mine for this many seconds, then stop cleanly
    /// (runs until interrupted when omitted)
    #[arg(short, long)]
    pub duration: Option<u64>,
}

/// Options for running the local benchmark
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Duration of the benchmark in seconds
    #[arg(short, long, default_value_t = 10)]
    pub duration: u64,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}
