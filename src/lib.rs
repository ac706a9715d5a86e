//! AVMerge CLI Library
//!
//! A command-line tool that merges a video-only and an audio-only media file
//! into a single output container, copying streams losslessly where the
//! target format allows it and falling back to transcoding where it does not.

pub mod cli;
pub mod engine;
pub mod error;
pub mod probe;

// Re-export commonly used types
pub use engine::{MergePhase, Merger};
pub use error::{MergeError, MergeResult};
pub use probe::{ContainerReport, StreamReport};

/// Initialize the AVMerge library
pub fn init() -> MergeResult<()> {
    // Initialize FFmpeg
    ffmpeg_next::init().map_err(|e| MergeError::InitError {
        message: e.to_string(),
    })?;

    Ok(())
}
