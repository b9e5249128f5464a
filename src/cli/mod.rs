//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for cnpj-delta using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// cnpj-delta - Incremental CNPJ registry ETL
#[derive(Parser, Debug)]
#[command(name = "cnpj-delta")]
#[command(version, about, long_about = None)]
#[command(author = "cnpj-delta Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "cnpj-delta.toml", env = "CNPJ_DELTA_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CNPJ_DELTA_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the structured store from raw extracts
    Ingest(commands::ingest::IngestArgs),

    /// Publish changed entities and tombstones as shards
    Export(commands::export::ExportArgs),

    /// Run ingest then export
    Pipeline(commands::pipeline::PipelineArgs),

    /// Write the canonical document of one entity
    Single(commands::single::SingleArgs),

    /// Archive every canonical document into one compressed file
    Archive(commands::archive::ArchiveArgs),

    /// Sample exported entities against store, cache and output
    Verify(commands::verify::VerifyArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show store, cache and shard status
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
