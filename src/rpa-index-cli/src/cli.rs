//! CLI argument definitions for rpa-index

use clap::Parser;
use rpa_index::DEFAULT_REPORT_NAME;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rpa-index")]
#[command(about = "Flatten a pickled Ren'Py archive index into a text report")]
#[command(version)]
pub struct Args {
    /// Path to the pickled index file
    pub input: PathBuf,

    /// Report destination (default matches the reference dump name)
    #[arg(short, long, default_value = DEFAULT_REPORT_NAME)]
    pub output: PathBuf,
}
