//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "cubifier")]
#[command(about = "Convert slicer G-code to the Cube (BfB) dialect")]
#[command(version)]
pub struct Args {
    /// G-code file to convert; the result is written next to it
    pub file: PathBuf,

    /// Enable debug-level logging
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Default log filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
