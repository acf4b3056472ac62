use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "podbutler",
    version,
    about = "Find podcasts by name, play them, and resume where you left off"
)]
pub struct Cli {
    /// Ledger database (defaults to the user data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Player command line; `{url}` and `{start}` are substituted
    #[arg(long, global = true)]
    pub player: Option<String>,

    /// Text-to-speech command that reads utterances from stdin
    #[arg(long, global = true)]
    pub tts: Option<String>,

    /// File holding the id of the component that owns the foreground
    #[arg(long, global = true)]
    pub activity_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read intents from stdin, one per line
    Run,
    /// List a show's episodes with saved resume positions
    Episodes { show: Vec<String> },
    /// Show the last played episode of every podcast
    History,
}
