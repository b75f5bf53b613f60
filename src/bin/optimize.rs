//! Genetic Parameter Optimizer Binary
//!
//! Runs a multi-objective genetic search over moving-average crossover
//! parameters on a CSV price history, streaming progress as JSON lines and
//! checkpointing the elite set to disk.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evotrade::application::optimization::{CoalescingReporter, OptimizationController};
use evotrade::config::{OptimizationConfig, RuntimeEnvConfig};
use evotrade::domain::optimization::EliteRecord;
use evotrade::infrastructure::observability::{OptimizerMetrics, ProgressLogSink};
use evotrade::infrastructure::persistence::CheckpointStore;
use evotrade::infrastructure::simulation::{CsvDataset, SmaCrossEvaluator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Multi-objective Parameter Optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one optimization on a CSV price history
    Run {
        /// TOML file with hyperparameters, objectives and parameter space
        #[arg(short, long)]
        config: PathBuf,

        /// CSV file with columns timestamp,open,high,low,close,volume
        #[arg(short, long)]
        data: PathBuf,

        /// Override the seed from the config file
        #[arg(long)]
        seed: Option<u64>,

        /// Override OPTIMIZER_OUTPUT_DIR
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the latest checkpoint of a previous run
    Show {
        /// Run id printed when the run started
        #[arg(short, long)]
        run_id: String,

        /// Override OPTIMIZER_OUTPUT_DIR
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let env = RuntimeEnvConfig::from_env()?;

    match cli.command {
        Commands::Run {
            config,
            data,
            seed,
            output_dir,
        } => {
            let mut optimization = OptimizationConfig::load(&config)?;
            if seed.is_some() {
                optimization.seed = seed;
            }
            let output_dir = output_dir.unwrap_or_else(|| env.output_dir.clone());
            run(optimization, data, output_dir, &env).await
        }
        Commands::Show { run_id, output_dir } => {
            let store = CheckpointStore::new(output_dir.unwrap_or(env.output_dir))?;
            match store.load_latest(&run_id)? {
                Some(checkpoint) => {
                    println!(
                        "Run {} | state {} | generation {} | epoch {} | written {}",
                        checkpoint.run_id,
                        checkpoint.state,
                        checkpoint.generation,
                        checkpoint.epoch,
                        checkpoint.written_at.to_rfc3339()
                    );
                    print_elite_table(&checkpoint.elite);
                }
                None => println!("No checkpoint found for run {}", run_id),
            }
            Ok(())
        }
    }
}

async fn run(
    config: OptimizationConfig,
    data: PathBuf,
    output_dir: PathBuf,
    env: &RuntimeEnvConfig,
) -> Result<()> {
    let dataset = Arc::new(CsvDataset::load(&data)?);
    let store = Arc::new(CheckpointStore::new(&output_dir)?);
    let metrics = OptimizerMetrics::new()?;
    let (reporter, forwarder) = CoalescingReporter::spawn(Arc::new(ProgressLogSink::new()));

    let controller = Arc::new(
        OptimizationController::new(
            Arc::new(SmaCrossEvaluator::default()),
            dataset,
            Arc::new(reporter.clone()),
            store.clone(),
            env.controller_settings(),
        )
        .with_metrics(metrics.clone()),
    );

    controller
        .start(config)
        .await
        .context("Optimization rejected at start")?;
    info!(
        "Run {} started, checkpoints in {}",
        controller.run_id(),
        output_dir.display()
    );

    let stopper = Arc::clone(&controller);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Stopping at next generation boundary...");
            if let Err(e) = stopper.stop().await {
                warn!("Stop ignored: {}", e);
            }
        }
    });

    let status = controller.wait().await;
    reporter.close();
    forwarder.await.ok();

    println!("\n{}", "=".repeat(80));
    println!(
        "Run {} finished as {} after {}/{} generations",
        status.run_id, status.state, status.generation, status.number_of_iterations
    );
    print_elite_table(&status.elite);
    println!(
        "Checkpoint: {}",
        store.path_for(controller.run_id()).display()
    );
    debug!("Final metrics:\n{}", metrics.render());
    Ok(())
}

fn print_elite_table(elite: &[EliteRecord]) {
    println!("{}", "=".repeat(80));
    println!("Elite ({} individuals, front-major, closest to ideal first)", elite.len());
    println!("{}", "-".repeat(80));

    for (i, record) in elite.iter().enumerate() {
        let genes = record
            .genes
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(" ");
        let fitness = record
            .fitness
            .iter()
            .map(|(name, value)| match value {
                Some(v) => format!("{}={:.4}", name, v),
                None => format!("{}=n/a", name),
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:<4} | front {:<2} | {} | {}",
            i + 1,
            record.rank,
            genes,
            fitness
        );
    }

    println!("{}\n", "=".repeat(80));
}
