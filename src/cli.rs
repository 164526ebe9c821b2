//! CLI definitions for Converge.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Converge CLI.
#[derive(Parser)]
#[command(name = "converge")]
#[command(about = "Converge a module container onto a desired set of resources")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "converge.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Register a desired set and wait until the container matches it
    Apply {
        /// Desired-set TOML file
        desired: PathBuf,

        /// Scheme owning the desired set (defaults to registry.scheme)
        #[arg(long)]
        scheme: Option<String>,

        /// Container state file (defaults to container.state_path)
        #[arg(long)]
        state: Option<PathBuf>,

        /// Give up waiting for convergence after this many seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },

    /// Show the registered resource groups
    Status {
        /// Only show resources of this scheme
        #[arg(long)]
        scheme: Option<String>,
    },
}
