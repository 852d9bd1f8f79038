//! rpa-index - flatten a pickled Ren'Py archive index into a text report

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;

mod cli;

use cli::Args;
use rpa_index::Index;

fn main() -> Result<()> {
    run(&Args::parse())
}

fn run(args: &Args) -> Result<()> {
    let data = fs::read(&args.input)
        .with_context(|| format!("Failed to read index file {:?}", args.input))?;

    let index = Index::from_slice(&data)
        .with_context(|| format!("Failed to decode index from {:?}", args.input))?;

    rpa_index::write_report(&index, &args.output)
        .with_context(|| format!("Failed to write report to {:?}", args.output))?;

    println!(
        "Wrote {} lines to {}",
        index.record_count(),
        args.output.display()
    );

    Ok(())
}
