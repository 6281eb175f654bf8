//! resilience-sim
//!
//! Command-line driver for the resilience layer.
//!
//! # Architecture Overview
//!
//! ```text
//!   simulate ──▶ BreakerRegistry ──▶ CircuitBreaker::execute
//!                                         │
//!                                         ▼
//!                                    with_retry ──▶ FlakyDependency
//!                                         │
//!                                         ▼
//!                                  backoff + jitter
//! ```
//!
//! # Commands
//! - `backoff`: print the delay schedule for the configured retry settings
//! - `simulate`: drive a flaky dependency and print breaker stats as JSON
//! - `check-config`: load and validate a config file

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::task::JoinSet;

use resilience_core::config::{load_config, load_from_env, ConfigError, ResilienceSettings};
use resilience_core::observability::{logging, metrics};
use resilience_core::resilience::{
    calculate_delay_with_rng, BreakerRegistry, BreakerStats, ResilienceError, RetryConfig,
    TransportError,
};

#[derive(Parser)]
#[command(name = "resilience-sim")]
#[command(about = "Exercise retry and circuit breaker policies", long_about = None)]
struct Cli {
    /// TOML config file; defaults plus RESILIENCE_* variables when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    metrics_address: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the retry delay schedule
    Backoff {
        #[arg(short, long, default_value_t = 5)]
        attempts: u32,

        /// Seed for reproducible jitter
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run calls against a simulated flaky dependency
    Simulate {
        #[arg(long, default_value_t = 100)]
        calls: u32,

        /// Probability in [0, 1] that a single attempt fails
        #[arg(long, default_value_t = 0.3)]
        failure_rate: f64,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value_t = 4)]
        concurrency: u32,

        /// Breaker name, matched against `[breakers.<name>]`
        #[arg(long, default_value = "flaky")]
        breaker: String,
    },
    /// Load and validate a config file
    CheckConfig { path: PathBuf },
}

#[derive(Debug, PartialEq, Serialize)]
struct DelayStep {
    attempt: u32,
    delay_ms: u64,
}

#[derive(Serialize)]
struct SimulationSummary {
    calls: u32,
    succeeded: u32,
    failed: u32,
    rejected: u32,
    elapsed_ms: u64,
    breakers: Vec<BreakerStats>,
}

/// Stand-in for a remote dependency that fails at random.
struct FlakyDependency {
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl FlakyDependency {
    fn new(failure_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    async fn call(&self) -> Result<u64, TransportError> {
        let (fail, latency_ms, kind) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            (rng.gen_bool(self.failure_rate), rng.gen_range(1..5), rng.gen_range(0..3))
        };
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        if !fail {
            return Ok(latency_ms);
        }
        Err(match kind {
            0 => TransportError::ConnectionReset,
            1 => TransportError::status(503, "service unavailable"),
            _ => TransportError::TimedOut,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::CheckConfig { path } => check_config(&path),
        Commands::Backoff { attempts, seed } => {
            let settings = setup(cli.config.as_deref(), cli.metrics_address.as_deref())?;
            let schedule = backoff_schedule(&settings, attempts, seed);
            println!("{}", serde_json::to_string_pretty(&schedule)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Simulate {
            calls,
            failure_rate,
            seed,
            concurrency,
            breaker,
        } => {
            let settings = setup(cli.config.as_deref(), cli.metrics_address.as_deref())?;
            let summary =
                simulate(&settings, &breaker, calls, failure_rate, seed, concurrency).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load settings, then bring up logging and, if asked for, metrics.
fn setup(
    config_path: Option<&Path>,
    metrics_address: Option<&str>,
) -> Result<ResilienceSettings, Box<dyn std::error::Error>> {
    let settings = match config_path {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init(&settings.observability)?;
    tracing::info!(
        max_retries = settings.retry.max_retries,
        failure_threshold = settings.circuit_breaker.failure_threshold,
        reset_timeout_ms = settings.circuit_breaker.reset_timeout_ms,
        "Configuration loaded"
    );

    let metrics_address = metrics_address.map(str::to_string).or_else(|| {
        settings
            .observability
            .metrics_enabled
            .then(|| settings.observability.metrics_address.clone())
    });
    if let Some(address) = metrics_address {
        match address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => {
                tracing::error!(metrics_address = %address, "Failed to parse metrics address");
            }
        }
    }

    Ok(settings)
}

/// Validation errors are listed on stderr and turn into a failing exit
/// code; the merged settings go to stdout as JSON.
fn check_config(path: &Path) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match load_config(path) {
        Ok(settings) => {
            eprintln!("{}: OK", path.display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(ConfigError::Validation(errors)) => {
            eprintln!("{}: {} validation error(s)", path.display(), errors.len());
            for error in &errors {
                eprintln!("  - {}", error);
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(Box::new(e)),
    }
}

fn backoff_schedule(
    settings: &ResilienceSettings,
    attempts: u32,
    seed: Option<u64>,
) -> Vec<DelayStep> {
    let config = RetryConfig::<TransportError>::from_settings(&settings.retry);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    (0..attempts)
        .map(|attempt| DelayStep {
            attempt: attempt + 1,
            delay_ms: calculate_delay_with_rng(attempt, &config, &mut rng).as_millis() as u64,
        })
        .collect()
}

async fn simulate(
    settings: &ResilienceSettings,
    breaker_name: &str,
    calls: u32,
    failure_rate: f64,
    seed: Option<u64>,
    concurrency: u32,
) -> Result<SimulationSummary, tokio::task::JoinError> {
    let registry = Arc::new(BreakerRegistry::from_settings(settings));
    let retry = Arc::new(RetryConfig::<TransportError>::from_settings(&settings.retry));
    let dependency = Arc::new(FlakyDependency::new(failure_rate, seed));

    let next = Arc::new(AtomicU32::new(0));
    let succeeded = Arc::new(AtomicU32::new(0));
    let failed = Arc::new(AtomicU32::new(0));
    let rejected = Arc::new(AtomicU32::new(0));

    let start = tokio::time::Instant::now();
    let mut workers = JoinSet::new();

    for _ in 0..concurrency.max(1) {
        let registry = registry.clone();
        let retry = retry.clone();
        let dependency = dependency.clone();
        let next = next.clone();
        let succeeded = succeeded.clone();
        let failed = failed.clone();
        let rejected = rejected.clone();
        let breaker_name = breaker_name.to_string();

        workers.spawn(async move {
            let breaker = registry.get_or_create(&breaker_name);
            while next.fetch_add(1, Ordering::Relaxed) < calls {
                let result = breaker
                    .execute(|| with_retry_call(&dependency, &retry))
                    .await
                    .map_err(ResilienceError::flatten);

                match result {
                    Ok(_) => succeeded.fetch_add(1, Ordering::Relaxed),
                    Err(e) if e.is_circuit_open() => rejected.fetch_add(1, Ordering::Relaxed),
                    Err(e) => {
                        tracing::debug!(error = %e, "Call failed");
                        failed.fetch_add(1, Ordering::Relaxed)
                    }
                };
            }
        });
    }

    while let Some(joined) = workers.join_next().await {
        joined?;
    }

    let summary = SimulationSummary {
        calls,
        succeeded: succeeded.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        rejected: rejected.load(Ordering::Relaxed),
        elapsed_ms: start.elapsed().as_millis() as u64,
        breakers: registry.snapshot(),
    };

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        rejected = summary.rejected,
        elapsed_ms = summary.elapsed_ms,
        "Simulation complete"
    );
    Ok(summary)
}

async fn with_retry_call(
    dependency: &FlakyDependency,
    retry: &RetryConfig<TransportError>,
) -> Result<u64, ResilienceError<TransportError>> {
    resilience_core::resilience::with_retry(|| dependency.call(), retry).await
}
