use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "rolegate", version)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print resolution counters in Prometheus text format to stderr on exit.
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve a single permission check and print the decision.
    Check {
        #[arg(long)]
        user: String,
        #[arg(long = "type")]
        resource_type: String,
        /// Omit to check against global grants only.
        #[arg(long)]
        resource: Option<String>,
        #[arg(long)]
        action: String,
        /// Resolve against a TOML seed file instead of the database.
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Print a user's permission matrix.
    Matrix {
        #[arg(long)]
        user: String,
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    Migrate,
}
