//! Media container inspection and reporting
//!
//! Produces a compact report of a container's format and streams, logged at
//! merge time for the two inputs and the finished output, and serializable
//! for the CLI's JSON output.

use std::path::Path;

use ffmpeg_next::format::stream::Stream;
use ffmpeg_next::{codec, format, media};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MergeError, MergeResult};

/// Snapshot of one container's format and streams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerReport {
    /// File path the container was opened from
    pub path: String,
    /// Short container format name
    pub format: String,
    /// Human-readable container format description
    pub format_description: String,
    /// Per-stream reports in index order
    pub streams: Vec<StreamReport>,
}

/// Snapshot of one stream's codec parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamReport {
    /// Ordinal index within the container
    pub index: usize,
    /// Media kind: video, audio, or other
    pub kind: String,
    /// Codec short name, or the raw identifier when no decoder is known
    pub codec: String,
    /// Frame width (video streams)
    pub width: Option<i32>,
    /// Frame height (video streams)
    pub height: Option<i32>,
    /// Sample rate in Hz (audio streams)
    pub sample_rate: Option<i32>,
    /// Channel count (audio streams)
    pub channels: Option<i32>,
    /// Declared bit rate, when the container carries one
    pub bit_rate: Option<i64>,
    /// Stream time base as numerator/denominator
    pub time_base: (i32, i32),
}

impl ContainerReport {
    /// Log the report through the tracing subscriber.
    pub fn log(&self) {
        info!(
            path = %self.path,
            format = %self.format,
            streams = self.streams.len(),
            "container opened"
        );
        for stream in &self.streams {
            debug!(
                index = stream.index,
                kind = %stream.kind,
                codec = %stream.codec,
                width = stream.width,
                height = stream.height,
                sample_rate = stream.sample_rate,
                channels = stream.channels,
                bit_rate = stream.bit_rate,
                time_base = ?stream.time_base,
                "stream"
            );
        }
    }
}

/// Open a container for reading and report on it.
pub fn inspect<P: AsRef<Path>>(path: P) -> MergeResult<ContainerReport> {
    ffmpeg_next::init().map_err(|e| MergeError::InitError {
        message: e.to_string(),
    })?;

    let path = path.as_ref();
    let input = format::input(&path).map_err(|e| MergeError::InputOpenError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    Ok(summarize_input(&input, path))
}

/// Report on an already-open input container.
pub fn summarize_input(input: &format::context::Input, path: &Path) -> ContainerReport {
    ContainerReport {
        path: path.display().to_string(),
        format: input.format().name().to_string(),
        format_description: input.format().description().to_string(),
        streams: input.streams().map(|s| summarize_stream(&s)).collect(),
    }
}

fn summarize_stream(stream: &Stream) -> StreamReport {
    let parameters = stream.parameters();
    let medium = parameters.medium();
    let codec_name = codec::decoder::find(parameters.id())
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| format!("{:?}", parameters.id()));
    let time_base = stream.time_base();

    // Raw parameter fields the safe wrapper does not expose.
    let (width, height, sample_rate, channels, bit_rate) = unsafe {
        let par = &*parameters.as_ptr();
        (
            par.width,
            par.height,
            par.sample_rate,
            par.ch_layout.nb_channels,
            par.bit_rate,
        )
    };

    let kind = match medium {
        media::Type::Video => "video",
        media::Type::Audio => "audio",
        _ => "other",
    };

    StreamReport {
        index: stream.index(),
        kind: kind.to_string(),
        codec: codec_name,
        width: (medium == media::Type::Video).then_some(width),
        height: (medium == media::Type::Video).then_some(height),
        sample_rate: (medium == media::Type::Audio).then_some(sample_rate),
        channels: (medium == media::Type::Audio).then_some(channels),
        bit_rate: (bit_rate > 0).then_some(bit_rate),
        time_base: (time_base.numerator(), time_base.denominator()),
    }
}
