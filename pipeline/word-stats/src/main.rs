// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod alphabet;
mod stages;
mod summary;

use clap::Parser;
use rand::Rng;
use stages::{CountLetters, Normalize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use summary::Summary;
use task_pipeline_core::{
    CancelToken, GateRegistry, Orchestrator, PipelineConfig, PipelineError, Task,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_ ";

/// Letter statistics over random strings, computed by a two-stage pipeline.
#[derive(Parser, Debug)]
#[command(name = "word-stats")]
struct Args {
    /// Pipeline configuration file (JSON). Defaults are used if it is missing.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Workers per stage, overriding the configuration file.
    #[arg(long)]
    workers: Option<usize>,

    /// Deadline for the whole run in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Number of random strings to generate.
    #[arg(long, default_value_t = 10_000)]
    strings: usize,

    /// Maximum length of a generated string.
    #[arg(long, default_value_t = 20)]
    max_len: usize,

    /// How many letters to list in the summary.
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Print the summary as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "word_stats=info,task_pipeline_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(args: &Args) -> PipelineConfig {
    let mut config = match PipelineConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "using default configuration");
            PipelineConfig::default()
        }
    };
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Some(Duration::from_millis(ms)));
    }
    config
}

/// Random string of 1 to `max_len` characters, mixing letters with digits and
/// separators.
fn generate_random_string(rng: &mut impl Rng, max_len: usize) -> String {
    let len = rng.random_range(1..=max_len.max(1));
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let start_time = Instant::now();

    let config = load_config(&args);
    config.validate()?;
    info!(
        strings = args.strings,
        max_len = args.max_len,
        workers = config.worker_count,
        timeout_ms = ?config.timeout_ms,
        "configuration loaded"
    );

    let mut rng = rand::rng();
    let tasks = Task::batch((0..args.strings).map(|_| generate_random_string(&mut rng, args.max_len)));
    let submitted = tasks.len();

    // Owns the run's parent signal; Ctrl+C cancels it.
    let shutdown = Arc::new(CancelToken::new(None));
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl+C received, cancelling run");
                ctrl_c.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl+C"),
        }
    });

    let registry = GateRegistry::new();
    let orchestrator = Orchestrator::new(config).with_parent(shutdown.signal());
    let outcome = orchestrator
        .run_chained(
            tasks,
            Normalize::new(registry.clone()),
            CountLetters::new(registry),
        )
        .await;

    match &outcome.error {
        None | Some(PipelineError::Cancelled { .. }) => {}
        Some(e) => return Err(e.clone().into()),
    }

    let summary = Summary::from_outcome(submitted, &outcome);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
    } else {
        summary.print(args.top);
        println!("Total time: {:.2}s", start_time.elapsed().as_secs_f64());
    }

    Ok(())
}
