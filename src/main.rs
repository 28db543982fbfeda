// src/main.rs
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use duco_miner_rs::miner::algorithm::DucoS1;
use duco_miner_rs::session::events::EventSink;
use duco_miner_rs::types::{HashRateSample, WorkUnit};
use duco_miner_rs::utils::logging::init_bench_logging;
use duco_miner_rs::{self, *};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main entry point for the Duco miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to the appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Event sink printing progress through the logger
///
/// The terminal event additionally signals the main thread, which is
/// parked waiting for the session to end.
struct ConsoleSink {
    terminal_tx: crossbeam_channel::Sender<()>,
}

impl EventSink for ConsoleSink {
    fn emit(&self, message: &str) {
        log::info!("{}", message);
    }

    fn emit_terminal(&self) {
        log::info!("{}", STOPPED_EVENT);
        let _ = self.terminal_tx.try_send(());
    }
}

/// Starts a mining session and blocks until it ends
///
/// # Arguments
/// * `opts` - Command line options for the mining operation
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads configuration (defaults when no file is given)
/// 3. Starts the session through the host boundary
/// 4. Waits for the terminal event, optionally stopping after a duration
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let config = match &opts.config {
        Some(path) => config::load(path)?,
        None => MinerConfig::default(),
    };

    log::info!(
        "starting miner for {} on {} cores x {} threads against {}",
        opts.username,
        opts.cores,
        opts.threads,
        config.server_url
    );

    let (terminal_tx, terminal_rx) = crossbeam_channel::bounded(1);
    let sink: Arc<dyn EventSink> = Arc::new(ConsoleSink { terminal_tx });
    host::start_mining_with(config, sink, &opts.username, opts.cores, opts.threads);

    match opts.duration {
        Some(seconds) => match terminal_rx.recv_timeout(Duration::from_secs(seconds)) {
            // the session ended on its own (stopped or failed)
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                log::info!("run duration elapsed, stopping");
                host::stop_mining();
                let _ = terminal_rx.recv_timeout(Duration::from_secs(30));
            }
        },
        None => {
            let _ = terminal_rx.recv();
        }
    }

    log::info!("{}", host::get_debug_info());
    Ok(())
}

/// Runs the local hashrate benchmark
///
/// # Arguments
/// * `opts` - Benchmark configuration options
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Spawns hashing threads against an unsatisfiable synthetic unit
/// 3. Collects and reports performance statistics
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    // 21 hex chars of target make a hit effectively impossible, so every
    // thread hashes for the full duration
    let unit = WorkUnit {
        last_block_hash: "ba29a15896fd2d792d5c4b60668bf2b9feebc51d".into(),
        target: "fffffffffffffffffffff".into(),
        difficulty: u64::MAX,
    };

    let reporter = stats::StatsReporter::new(Duration::from_secs(5));
    let sample_tx = reporter.sample_sender();
    let reporting = CancelToken::new();
    reporter.start_reporting(reporting.clone());

    log::info!(
        "Starting benchmark on {} threads for {} seconds",
        opts.threads,
        opts.duration
    );

    let start_time = Instant::now();
    let handles: Vec<_> = (0..opts.threads)
        .map(|id| {
            let unit = unit.clone();
            let sender = sample_tx.clone();
            std::thread::spawn(move || {
                let algo = DucoS1::new(&unit, "benchmark");
                let mut nonce = (id as u64) << 40; // disjoint start per thread
                let mut hashes: u64 = 0;
                let mut window_hashes: u64 = 0;
                let mut last_log = Instant::now();

                while start_time.elapsed().as_secs() < opts.duration {
                    let _ = algo.try_nonce(nonce);
                    nonce += 1;
                    hashes += 1;
                    window_hashes += 1;

                    // Report progress every second
                    if window_hashes % 10_000 == 0 && last_log.elapsed().as_secs() >= 1 {
                        let rate = window_hashes as f64 / last_log.elapsed().as_secs_f64();
                        let _ = sender.send(HashRateSample {
                            worker_id: id,
                            hashes_per_second: rate,
                        });
                        log::debug!("Thread {}: {:.1} H/s", id, rate);
                        window_hashes = 0;
                        last_log = Instant::now();
                    }
                }
                hashes
            })
        })
        .collect();

    // Wait for all threads to complete
    let mut total_hashes: u64 = 0;
    for handle in handles {
        total_hashes += handle.join().unwrap_or(0);
    }
    reporting.cancel();

    // Report final results
    log::info!("Benchmark results:");
    log::info!("Total hashes: {}", total_hashes);
    log::info!(
        "Average hashrate: {:.2} H/s",
        total_hashes as f64 / opts.duration.max(1) as f64
    );
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates a configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    std::fs::write(&opts.output, config::generate_template())?;
    log::info!("wrote configuration template to {}", opts.output.display());
    Ok(())
}
