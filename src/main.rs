//! Centinela CLI
//!
//! # Usage
//!
//! ```bash
//! # Train from config
//! centinela train config.yaml
//!
//! # One-shot evaluation with the same wiring
//! centinela infer config.yaml
//!
//! # Validate config
//! centinela validate config.yaml
//!
//! # Show config info
//! centinela info config.yaml
//! ```

use centinela::api::{build_engine, Registries};
use centinela::config::load_spec;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Centinela: video anomaly-detection training and inference harness
#[derive(Parser, Debug)]
#[command(name = "centinela")]
#[command(version)]
#[command(about = "Registry-driven training/inference harness for video anomaly detection")]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model from YAML configuration
    Train(RunArgs),

    /// Run one-shot evaluation over the held-out split
    Infer(RunArgs),

    /// Validate a configuration file without running anything
    Validate(ConfigArgs),

    /// Display information about a configuration
    Info(ConfigArgs),
}

/// Arguments for train/infer
#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the start step
    #[arg(long)]
    start_step: Option<u64>,

    /// Override the step bound
    #[arg(long)]
    max_steps: Option<u64>,
}

/// Arguments for validate/info
#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let result = match cli.command {
        Command::Train(args) => run_train(args, cli.verbose),
        Command::Infer(args) => run_infer(args, cli.verbose),
        Command::Validate(args) => run_validate(args),
        Command::Info(args) => run_info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn config_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("config")
        .to_string()
}

fn run_train(args: RunArgs, verbose: bool) -> centinela::Result<()> {
    let mut spec = load_spec(&args.config)?;
    if let Some(start) = args.start_step {
        spec.train.start_step = start;
    }
    if let Some(max) = args.max_steps {
        spec.train.max_steps = max;
    }

    let registries = Registries::builtin()?;
    let mut engine = build_engine(&registries, &spec, &config_name(&args.config), verbose)?;

    engine.run(spec.train.start_step, spec.train.max_steps)?;

    println!("Training complete");
    if let Some(path) = &engine.state().result_path {
        println!("  Latest checkpoint: {}", path.display());
    }
    println!("  Best accuracy: {:.4}", engine.state().best_accuracy);
    Ok(())
}

fn run_infer(args: RunArgs, verbose: bool) -> centinela::Result<()> {
    let spec = load_spec(&args.config)?;

    let registries = Registries::builtin()?;
    let mut engine = build_engine(&registries, &spec, &config_name(&args.config), verbose)?;

    engine.run_inference()?;

    println!("Inference complete");
    Ok(())
}

fn run_validate(args: ConfigArgs) -> centinela::Result<()> {
    load_spec(&args.config)?;
    println!("Config OK: {}", args.config.display());
    Ok(())
}

fn run_info(args: ConfigArgs) -> centinela::Result<()> {
    let spec = load_spec(&args.config)?;

    println!("Config: {}", args.config.display());
    println!("  Model: {} (frame_dim={}, flow_dim={})",
        spec.model.name, spec.model.frame_dim, spec.model.flow_dim);
    println!(
        "  Dataset: {} (factory={}, eval={})",
        spec.dataset.name, spec.dataset.factory, spec.dataset.eval_method
    );
    println!(
        "  Steps: [{}, {}) batch={}",
        spec.train.start_step, spec.train.max_steps, spec.train.batch_size
    );
    println!(
        "  Optimizer: {} (lr={})",
        spec.train.optimizer.name, spec.train.optimizer.lr
    );
    if spec.train.scheduler.enabled {
        println!("  Scheduler: cosine (t_max={})", spec.train.scheduler.t_max);
    }
    println!(
        "  Losses: {}",
        spec.train
            .lamada
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
