//! Microscopy container CLI
//!
//! Command-line front end for inspecting LIF containers, previewing planes
//! and exporting single images.

use clap::Parser;
use microimg_extract::cli::{run, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
