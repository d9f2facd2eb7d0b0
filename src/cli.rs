use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Signal configuration (.json); script files are relative to it
    pub config: PathBuf,
    /// Scenario (.json) to evaluate against the loaded scripts
    #[arg(long)]
    pub scenario: Option<PathBuf>,
    /// Output directory for the listing and JSON dumps
    #[arg(long)]
    pub out: Option<PathBuf>,
}
