use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "boxstash",
    about = "boxstash: chunked blob storage on a constrained box store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML client configuration; reference defaults when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Estimate the rent of storing a blob
    Estimate(EstimateArgs),
    /// Show how a file splits into slots, chunks, and batches
    Plan(PlanArgs),
    /// Upload, resolve, and delete a file on an in-memory store
    Simulate(SimulateArgs),
    /// Print or write the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct EstimateArgs {
    /// File to estimate
    #[arg(required_unless_present = "size")]
    pub file: Option<PathBuf>,
    /// Blob length in bytes, instead of a file
    #[arg(long, conflicts_with = "file")]
    pub size: Option<u64>,
}

#[derive(Args)]
pub struct PlanArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct SimulateArgs {
    pub file: PathBuf,
    #[arg(long, default_value = "1")]
    pub app_id: u64,
    /// Hex seed of the uploading account; random when omitted
    #[arg(long)]
    pub seed: Option<String>,
    /// Leave the blob stored instead of deleting it
    #[arg(long)]
    pub keep: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the configuration to this path
    #[arg(long)]
    pub write: Option<PathBuf>,
}
