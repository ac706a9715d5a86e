//! AVMerge CLI
//!
//! A command-line tool that merges a video-only and an audio-only media file
//! into a single output container.
//!
//! # Usage
//!
//! ```bash
//! avmerge --video video.m4s --audio audio.m4s --output merged.mp4
//! avmerge -v video.mp4 -a audio.aac -o merged.mkv --json
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use avmerge_cli::cli::Cli;
use avmerge_cli::{probe, Merger};

/// Main entry point for the AVMerge CLI application
fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Parse command line arguments
    let cli = Cli::parse();

    avmerge_cli::init()?;

    let mut merger = Merger::new();
    if let Err(e) = merger.merge(&cli.video, &cli.audio, &cli.output) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    info!("merge succeeded: {}", cli.output);

    if cli.json {
        let report = probe::inspect(&cli.output)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
