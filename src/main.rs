//! MMLU Prompt Eval CLI
//!
//! Baseline versus best-paraphrase accuracy on MMLU subjects

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mmlu_prompt_eval::{
    config::parse_model_list, Experiment, ExperimentConfig, ExperimentSummary, OllamaBackend,
    RunMode,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mmlu-prompt-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file (environment variables apply on top)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Comma separated models, overrides the configuration
    #[arg(long, global = true)]
    models: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run baseline and optimized evaluation for every model
    Run,

    /// Generate the prompt variant file for one model
    Generate {
        /// Model identifier (e.g. qwen2.5:latest)
        #[arg(long)]
        model: String,
    },

    /// Run a single evaluation mode for one model
    Evaluate {
        /// Model identifier
        #[arg(long)]
        model: String,

        /// baseline or optimized
        #[arg(long, default_value = "baseline")]
        mode: RunMode,
    },

    /// Print the stored experiment summary
    Summary,
}

fn load_config(cli: &Cli) -> Result<ExperimentConfig> {
    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid environment override")?;
    if let Some(models) = &cli.models {
        config.llm_models = parse_model_list(models);
    }
    Ok(config)
}

fn print_summary(summary: &ExperimentSummary) {
    println!("FINAL SUMMARY");
    for (model, entry) in &summary.llm_models {
        println!();
        println!("{model}:");
        for line in entry.lines() {
            println!("  {line}");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(&cli)?;
    tracing::debug!(?config, "Loaded configuration");

    let backend = OllamaBackend::from_config(&config);
    let experiment = Experiment::new(config, backend);

    match cli.command {
        Commands::Run => {
            let summary = experiment.run().context("Experiment aborted")?;
            print_summary(&summary);
            println!();
            println!(
                "Experiment summary saved to {}",
                experiment.summary_path().display()
            );
        }
        Commands::Generate { model } => {
            let questions = experiment.prepare()?;
            experiment.layout().prepare_model_dir(&model)?;
            let table = experiment
                .ensure_variants(&model, &questions)
                .with_context(|| format!("Variant generation failed for {model}"))?;
            println!(
                "{} rows of prompt variants at {}",
                table.len(),
                experiment.layout().variants_path(&model).display()
            );
        }
        Commands::Evaluate { model, mode } => {
            let questions = experiment.prepare()?;
            experiment.layout().prepare_model_dir(&model)?;
            let report = experiment
                .evaluate(&model, mode, &questions)
                .with_context(|| format!("{mode} evaluation failed for {model}"))?;
            println!(
                "{model} {mode}: {:.2}% ({}/{})",
                report.accuracy, report.correct, report.total
            );
        }
        Commands::Summary => {
            let path = experiment.summary_path();
            let summary = ExperimentSummary::load(&path)
                .with_context(|| format!("No experiment summary at {}", path.display()))?;
            print_summary(&summary);
        }
    }

    Ok(())
}
