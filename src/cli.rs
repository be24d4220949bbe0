use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rival")]
#[command(about = "Pomodoro study sessions with focus tracking", long_about = None)]
pub struct Cli {
    /// Directory for the local database and settings (defaults to the user data dir)
    #[arg(long, global = true, env = "RIVAL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a study session in the foreground (Ctrl-C stops it)
    Study {
        /// Number of focus/break cycles, defaults to the configured value
        #[arg(short, long)]
        cycles: Option<u32>,
    },

    /// Show the persisted session and any reports waiting to be saved
    Status,

    /// Resubmit reports whose earlier submission failed
    Retry,
}
