//! Merge pipeline orchestration
//!
//! One [`Merger`] call runs the whole pipeline: open both inputs and the
//! output, build the stream table, write the header, pump packets, flush
//! transcode sessions, write the trailer. Every resource lives in a per-call
//! job struct so teardown is deterministic on success and failure alike.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use ffmpeg_next::format;
use tracing::{debug, info, warn};

use crate::engine::table::{self, SourceRole, StreamMapping};
use crate::engine::transcode::TranscodeSession;
use crate::engine::{pump, MergePhase};
use crate::error::{MergeError, MergeResult};
use crate::probe;

/// Everything owned by one merge invocation.
///
/// Field order is teardown order: the video input closes first, then the
/// audio input, then the output container.
struct MergeJob {
    video_in: format::context::Input,
    audio_in: format::context::Input,
    output: format::context::Output,
    mapping: StreamMapping,
    sessions: HashMap<usize, TranscodeSession>,
}

impl MergeJob {
    fn open(video_path: &Path, audio_path: &Path, output_path: &Path) -> MergeResult<Self> {
        let video_in = format::input(&video_path).map_err(|e| MergeError::InputOpenError {
            path: video_path.display().to_string(),
            message: e.to_string(),
        })?;

        let audio_in = format::input(&audio_path).map_err(|e| MergeError::InputOpenError {
            path: audio_path.display().to_string(),
            message: e.to_string(),
        })?;

        let output = format::output(&output_path).map_err(|e| MergeError::OutputCreateError {
            path: output_path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            video_in,
            audio_in,
            output,
            mapping: StreamMapping::default(),
            sessions: HashMap::new(),
        })
    }
}

/// Merges one video-only and one audio-only container into a single output
///
/// Reusable across calls; the phase and last-error string always describe the
/// most recent call.
#[derive(Default)]
pub struct Merger {
    phase: MergePhase,
    last_error: Option<String>,
}

impl Merger {
    /// Create a new merger
    pub fn new() -> Self {
        Self {
            phase: MergePhase::Idle,
            last_error: None,
        }
    }

    /// Merge `video_path` and `audio_path` into `output_path`.
    ///
    /// Any failure aborts the whole merge; a partially written output file is
    /// the caller's to delete or ignore.
    pub fn merge<V, A, O>(&mut self, video_path: V, audio_path: A, output_path: O) -> MergeResult<()>
    where
        V: AsRef<Path>,
        A: AsRef<Path>,
        O: AsRef<Path>,
    {
        self.phase = MergePhase::Idle;
        self.last_error = None;

        let result = self.run(
            video_path.as_ref(),
            audio_path.as_ref(),
            output_path.as_ref(),
        );

        if let Err(e) = &result {
            self.phase = MergePhase::Failed;
            self.last_error = Some(e.to_string());
            warn!("merge failed: {}", e);
        }

        result
    }

    /// Human-readable error recorded by the most recent failed call.
    ///
    /// Reset at the start of each call, never cleared otherwise.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Phase the most recent call reached
    pub fn phase(&self) -> MergePhase {
        self.phase
    }

    fn run(&mut self, video_path: &Path, audio_path: &Path, output_path: &Path) -> MergeResult<()> {
        let started = Instant::now();
        info!(
            video = %video_path.display(),
            audio = %audio_path.display(),
            output = %output_path.display(),
            "starting merge"
        );

        ffmpeg_next::init().map_err(|e| MergeError::InitError {
            message: e.to_string(),
        })?;

        let mut job = MergeJob::open(video_path, audio_path, output_path)?;
        self.phase = MergePhase::InputsOpened;

        probe::summarize_input(&job.video_in, video_path).log();
        probe::summarize_input(&job.audio_in, audio_path).log();

        let (mapping, sessions) =
            table::build_stream_table(&job.video_in, &job.audio_in, &mut job.output)?;
        job.mapping = mapping;
        job.sessions = sessions;
        self.phase = MergePhase::StreamsMapped;

        job.output
            .write_header()
            .map_err(|e| MergeError::HeaderWriteError {
                message: e.to_string(),
            })?;
        self.phase = MergePhase::HeaderWritten;

        let video_packets = pump::drain_input(
            &mut job.video_in,
            SourceRole::Video,
            &job.mapping,
            &mut job.sessions,
            &mut job.output,
        )?;
        let audio_packets = pump::drain_input(
            &mut job.audio_in,
            SourceRole::Audio,
            &job.mapping,
            &mut job.sessions,
            &mut job.output,
        )?;
        pump::flush_sessions(&mut job.sessions, &mut job.output)?;
        self.phase = MergePhase::PacketsFlushed;

        job.output
            .write_trailer()
            .map_err(|e| MergeError::TrailerWriteError {
                message: e.to_string(),
            })?;
        self.phase = MergePhase::TrailerWritten;

        debug!(
            video_packets,
            audio_packets,
            output_streams = job.mapping.output_count(),
            "all packets flushed"
        );
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "merge completed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_merger_is_idle_with_no_error() {
        let merger = Merger::new();
        assert_eq!(merger.phase(), MergePhase::Idle);
        assert!(merger.last_error().is_none());
    }
}
