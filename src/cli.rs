use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "devbox")]
#[command(version)]
#[command(about = "Provision a developer workstation with reversible changes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (repeat for debug and trace logging)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file [default: ~/.config/devbox/config.toml]
    #[arg(long, env = "DEVBOX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List registered changes
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply changes, skipping those already applied
    Apply(BatchArgs),

    /// Roll back changes
    Rollback(BatchArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
pub struct BatchArgs {
    /// Change names, comma-separated or repeated
    #[arg(required = true, value_delimiter = ',', num_args = 1..)]
    pub names: Vec<String>,
}

impl BatchArgs {
    /// Names with whitespace trimmed and empty entries dropped
    pub fn selection(&self) -> Vec<String> {
        self.names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }
}
