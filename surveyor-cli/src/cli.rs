use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "surveyor")]
#[command(about = "Validate, plan and dry-run LLM survey studies", long_about = None)]
pub struct Cli {
    /// Emit logs as newline-delimited JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the survey and print its question order
    Validate {
        /// Study file (JSON)
        study: PathBuf,
    },

    /// Print interview and task counts and the result columns
    Plan {
        /// Study file (JSON)
        study: PathBuf,
    },

    /// Run the study end to end against a scripted provider
    DryRun {
        /// Study file (JSON)
        study: PathBuf,

        /// Run configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON-lines response cache to read and extend
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Write the result table and exceptions here as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a JSON-lines response cache
    CacheStats {
        /// Cache file
        cache: PathBuf,
    },
}
