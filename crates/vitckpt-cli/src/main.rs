//! vitckpt CLI
//!
//! Command-line interface for creating, inspecting and adapting checkpoints.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use vitckpt::checkpoint::{is_safetensors, read_safetensors, write_safetensors};
use vitckpt::prelude::*;
use vitckpt::utils::{abbreviate, format_bytes, format_shape};

#[derive(Parser)]
#[command(name = "vitckpt")]
#[command(version, about = "vitckpt - Vision transformer checkpoint tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write freshly initialised weights for a model layout
    Init {
        /// Experiment config (TOML or JSON); Swin-T defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file (.pth record or .safetensors)
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Show the contents of a checkpoint or weight file
    Inspect {
        /// Checkpoint or weight file
        path: PathBuf,

        /// Print a JSON summary instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List epoch checkpoints in a directory
    List {
        /// Checkpoint directory
        #[arg(long, default_value = "output")]
        dir: PathBuf,
    },

    /// Adapt pretrained weights to the configured model and save them
    Adapt {
        /// Experiment config naming the pretrained weights and model layout
        #[arg(long)]
        config: PathBuf,

        /// Output file (.pth record or .safetensors)
        #[arg(long, short)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { config, output } => {
            init(config.as_deref(), &output)?;
        }
        Commands::Inspect { path, json } => {
            inspect(&path, json)?;
        }
        Commands::List { dir } => {
            list(dir)?;
        }
        Commands::Adapt { config, output } => {
            adapt(&config, &output)?;
        }
    }

    Ok(())
}

fn load_experiment(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ExperimentConfig::default()),
    }
}

fn write_weights(state: &StateDict, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    if is_safetensors(output) {
        write_safetensors(state, output)?;
    } else {
        CheckpointRecord::new(state.clone()).write(output)?;
    }
    Ok(())
}

fn init(config: Option<&Path>, output: &Path) -> Result<()> {
    let experiment = load_experiment(config)?;
    let model = experiment.model.build()?;

    write_weights(&model.state_dict(), output)?;
    println!(
        "Wrote {} tensors ({} parameters) to {}",
        model.len(),
        abbreviate(model.num_parameters() as u64),
        output.display()
    );
    Ok(())
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let (state, record) = if is_safetensors(path) {
        (read_safetensors(path)?, None)
    } else {
        let record = CheckpointRecord::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        (record.model.clone(), Some(record))
    };

    if json {
        let tensors: serde_json::Map<String, serde_json::Value> = state
            .iter()
            .map(|(name, tensor)| (name.clone(), serde_json::json!(tensor.shape())))
            .collect();
        let entries: Vec<String> = record
            .as_ref()
            .map(|r| r.entries().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default();
        let summary = serde_json::json!({
            "path": path.display().to_string(),
            "epoch": record.as_ref().and_then(|r| r.epoch),
            "version": record.as_ref().map(|r| r.version.clone()),
            "entries": entries,
            "num_elements": state.num_elements(),
            "tensors": tensors,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("File: {}", path.display());
    if let Some(record) = &record {
        match record.epoch {
            Some(epoch) => println!("Epoch: {}", epoch),
            None => println!("Epoch: -"),
        }
        println!("Written by: vitckpt {}", record.version);
        println!("Keys: {}", record.keys().join(", "));
        for (key, data) in record.entries() {
            println!("  {:<12} {}", key, format_bytes(data.len() as u64));
        }
    }
    println!(
        "Tensors: {} ({} elements)",
        state.len(),
        abbreviate(state.num_elements() as u64)
    );
    println!();
    for (name, tensor) in state.iter() {
        println!("  {:<60} {}", name, format_shape(tensor.shape()));
    }
    Ok(())
}

fn list(dir: PathBuf) -> Result<()> {
    let manager = CheckpointManager::new(CheckpointConfig::new(dir));
    let checkpoints = manager.list_checkpoints()?;

    if checkpoints.is_empty() {
        println!("No checkpoints in {}", manager.checkpoint_dir().display());
        return Ok(());
    }

    println!("Checkpoints in {}:", manager.checkpoint_dir().display());
    println!();
    for (epoch, path) in &checkpoints {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        println!("  epoch {:>5}   {:>10}   {}", epoch, format_bytes(size), path.display());
    }

    let best = manager.config().best_path();
    if best.exists() {
        println!();
        println!("  best           {}", best.display());
    }
    Ok(())
}

fn adapt(config: &Path, output: &Path) -> Result<()> {
    let experiment = load_experiment(Some(config))?;
    let manager = CheckpointManager::new(experiment.checkpoint.clone());
    let mut model = experiment.model.build()?;

    let report = manager.load_pretrained(&mut model)?;
    write_weights(&model.state_dict(), output)?;

    println!("Removed buffers: {}", report.removed_buffers.len());
    println!("Resized: {}", report.resized.len());
    for key in &report.resized {
        println!("  {}", key);
    }
    println!("Skipped: {}", report.skipped.len());
    for key in &report.skipped {
        println!("  {}", key);
    }
    println!("Head: {:?}", report.head);
    println!("Load: {}", report.load);
    println!("Wrote adapted weights to {}", output.display());
    Ok(())
}
