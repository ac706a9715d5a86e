//! CLI module for AVMerge
//!
//! This module handles command-line argument parsing.

use clap::Parser;

/// AVMerge CLI
///
/// Merges a separate video-only and audio-only media file into a single
/// output container, copying streams losslessly where the target format
/// allows it and transcoding where it does not.
#[derive(Parser, Debug)]
#[command(name = "avmerge")]
#[command(about = "Merge a video-only and an audio-only file into one container")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Video input file path
    #[arg(short = 'v', long)]
    pub video: String,

    /// Audio input file path
    #[arg(short = 'a', long)]
    pub audio: String,

    /// Output file path; the container format follows the extension
    #[arg(short = 'o', long)]
    pub output: String,

    /// Print the merged container's report as JSON
    #[arg(long)]
    pub json: bool,
}
