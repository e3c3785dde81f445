use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "encore", about = "Record/replay engine toolbox")]
pub struct Args {
    /// Path to the YAML configuration, defaults to config.yml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Drive a scripted session through the engine
    Run(RunArgs),
    /// Show the header of a record file
    Info(FileArgs),
    /// Dump the decoded event stream of a record file
    Events(EventsArgs),
    /// List or export the screenshots stored in a record file
    Screens(ScreensArgs),
    /// Edit the author/name/notes of an existing record file
    Edit(EditArgs),
    /// Delete a record file from the save directory
    Delete(FileArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Session mode: record, playback, or pass
    #[arg(short, long, default_value = "record")]
    pub mode: String,

    /// Record file name inside the save directory. Defaults to the
    /// configured name, then to a generated per-game slot
    #[arg(short, long)]
    pub file: Option<String>,

    /// Number of clock ticks to drive
    #[arg(short, long, default_value_t = 120)]
    pub ticks: u32,

    /// The author stored in a fresh recording
    #[arg(long)]
    pub author: Option<String>,
}

#[derive(Debug, Parser)]
pub struct FileArgs {
    /// Record file name inside the save directory
    pub file: String,
}

#[derive(Debug, Parser)]
pub struct EventsArgs {
    /// Record file name inside the save directory
    pub file: String,

    /// Stop after this many events
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Parser)]
pub struct ScreensArgs {
    /// Record file name inside the save directory
    pub file: String,

    /// Export decoded screenshots into this directory as raw RGBA
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct EditArgs {
    /// Record file name inside the save directory
    pub file: String,

    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}
