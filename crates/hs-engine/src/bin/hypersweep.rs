//! HyperSweep command-line tool.
//!
//! Usage:
//!   hypersweep space [--root DIR] [--json]
//!   hypersweep tune --model <nequip|mace> [--study-name NAME] [--trials N]
//!                   [--config FILE] [--root DIR]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hs_engine::{TrialEvaluator, TuningConfig};
use hs_optimizer::{Study, StrategyKind};
use hs_scheduler::SlurmScheduler;
use hs_space::{discover_studies, ModelKind, StudyDir};
use hs_tracking::WandbClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Hyperparameter search over Slurm training jobs
#[derive(Parser)]
#[command(name = "hypersweep")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Tuning configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tunable parameters of every study directory
    Space {
        /// Directory holding the opt_<Model> study directories
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Print the extraction reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a study for one model
    Tune {
        /// Model whose study directory (opt_<Model>) is tuned
        #[arg(long)]
        model: ModelKind,

        /// Study name (overrides the config file)
        #[arg(long)]
        study_name: Option<String>,

        /// Number of trials (overrides the config file)
        #[arg(long)]
        trials: Option<usize>,

        /// Search strategy: grid or random (overrides the config file)
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Metric key to read from the tracking run
        #[arg(long)]
        metric_key: Option<String>,

        /// Directory holding the opt_<Model> study directories
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Weights & Biases API key
        #[arg(long, env = "WANDB_API_KEY", hide_env_values = true)]
        wandb_api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match cli.config {
        Some(ref path) => TuningConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TuningConfig::default(),
    };

    match cli.command {
        Commands::Space { root, json } => show_space(&root, json),
        Commands::Tune {
            model,
            study_name,
            trials,
            strategy,
            metric_key,
            root,
            wandb_api_key,
        } => {
            let mut config = config;
            if let Some(name) = study_name {
                config = config.with_study_name(name);
            }
            if let Some(n) = trials {
                config = config.with_n_trials(n);
            }
            if let Some(strategy) = strategy {
                config = config.with_strategy(strategy);
            }
            if let Some(key) = metric_key {
                config = config.with_metric_key(key);
            }
            if let Some(key) = wandb_api_key {
                config = config.with_wandb_api_key(key);
            }
            config.validate()?;
            tune(&root, model, config).await
        }
    }
}

fn show_space(root: &Path, json: bool) -> Result<()> {
    let studies = discover_studies(root)?;
    if studies.is_empty() {
        warn!(root = %root.display(), "no study directories found");
        return Ok(());
    }

    if json {
        let reports: serde_json::Map<String, serde_json::Value> = studies
            .iter()
            .map(|study| {
                Ok((
                    study.root.display().to_string(),
                    serde_json::to_value(&study.report)?,
                ))
            })
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for study in &studies {
        println!("{} (model {})", study.root.display(), study.model_name);
        for (path, candidates) in study.report.space.iter() {
            let values: Vec<String> = candidates.iter().map(|v| v.to_string()).collect();
            println!("  {path}: [{}]", values.join(", "));
        }
        for skipped in &study.report.skipped {
            println!("  {} skipped: {}", skipped.path, skipped.error);
        }
        match study.report.space.grid_size() {
            Some(size) => println!("  grid size: {size}"),
            None => println!("  grid size: overflow"),
        }
    }
    Ok(())
}

fn find_study(root: &Path, model: ModelKind) -> Result<StudyDir> {
    let studies = discover_studies(root)?;
    let Some(study) = studies
        .into_iter()
        .find(|s| matches!(s.model_kind(), Ok(kind) if kind == model))
    else {
        bail!(
            "no study directory for model {model} under {} (expected opt_{model}/)",
            root.display()
        );
    };
    Ok(study)
}

async fn tune(root: &Path, model: ModelKind, config: TuningConfig) -> Result<()> {
    let study_dir = find_study(root, model)?;
    if study_dir.report.space.is_empty() {
        bail!("{} has no tunable parameters", study_dir.config_path().display());
    }
    if config.wandb.api_key.is_empty() {
        warn!("WANDB_API_KEY is not set; metric retrieval will likely fail");
    }

    let scheduler = Arc::new(SlurmScheduler::new(config.slurm.clone()));
    let metrics = Arc::new(WandbClient::new(config.wandb.clone()));
    let evaluator = TrialEvaluator::new(
        &study_dir,
        model,
        scheduler,
        metrics,
        config.monitor_config(),
    )
    .with_metric_key(config.metric_key.clone());

    let mut study = Study::new(config.study_config(), study_dir.report.space.clone());
    let status = study.optimize(&evaluator).await.clone();

    match study.best_trial() {
        Some(best) => {
            info!(
                study = %config.study_name,
                trial = best.number,
                value = ?best.value,
                "best trial"
            );
            for (path, value) in best.assignment.iter() {
                println!("{path} = {value}");
            }
        }
        None => warn!(study = %config.study_name, "no trial produced a result"),
    }
    println!(
        "completed {} trials, pruned {}",
        status.trials_completed, status.trials_pruned
    );
    Ok(())
}
