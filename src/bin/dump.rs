//! # dump
//!
//! Copy each file named on the command line to stdout, in order.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Files to copy to stdout.
    paths: Vec<PathBuf>,
}

pub fn main() -> eyre::Result<ExitCode> {
    cleave::logging::configure_logging();
    let cli = Cli::parse();

    let mut stdout = std::io::stdout().lock();
    let report = cleave::dump::copy_files(&cli.paths, &mut stdout)?;
    info!(files = report.files, bytes = report.bytes, failed = report.failures.len(), "done");

    if report.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
