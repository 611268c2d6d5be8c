//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tollgate — authentication core for an HTTP API gateway
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about)]
pub struct Cli {
    /// Path to the configuration file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the listen host
    #[arg(long)]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format (json for structured output)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Subcommand; defaults to serving
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway (default)
    Serve,
    /// Load and validate the configuration, then exit
    CheckConfig,
}
