// ABOUTME: Command-line interface definition
// ABOUTME: `run` is the default subcommand; `config` and `paths` are diagnostics

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tdlink", version, about = "Telegram console client")]
pub struct Cli {
    /// Config file (default: TDLINK_CONFIG_PATH, ./config.toml, then the XDG config dir)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Connect, log in, and stream events until interrupted
    Run,
    /// Print the resolved configuration with secrets redacted
    Config,
    /// Print the directories tdlink reads and writes
    Paths,
}

impl Cli {
    pub fn selected(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
