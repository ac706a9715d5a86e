//! Output stream table construction
//!
//! Mirrors every input stream into the output container, either by verbatim
//! parameter copy or by transcode-session setup, and records which output
//! index each source stream landed on.

use std::collections::HashMap;

use ffmpeg_next::codec::{self, Id};
use ffmpeg_next::format;
use tracing::{debug, trace};

use crate::engine::compat::{self, Compatibility};
use crate::engine::transcode::{self, TranscodeSession};
use crate::error::{MergeError, MergeResult};

/// Which input container a source stream belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceRole {
    Video,
    Audio,
}

impl SourceRole {
    /// Short label for log lines
    pub fn label(&self) -> &'static str {
        match self {
            SourceRole::Video => "video",
            SourceRole::Audio => "audio",
        }
    }
}

/// Mapping from (source role, source stream index) to output stream index
///
/// Built once while the stream table is constructed, read-only afterwards.
/// Output indices are contiguous from 0; the video container's streams occupy
/// the low range, the audio container's streams the range that follows.
#[derive(Debug, Default, Clone)]
pub struct StreamMapping {
    video: Vec<usize>,
    audio: Vec<usize>,
}

impl StreamMapping {
    /// Record the output index assigned to the next source stream of `role`.
    ///
    /// Source streams are enumerated in index order, so the position within
    /// the per-role table is the source index.
    pub fn record(&mut self, role: SourceRole, output_index: usize) {
        match role {
            SourceRole::Video => self.video.push(output_index),
            SourceRole::Audio => self.audio.push(output_index),
        }
    }

    /// Look up the output stream index for a source stream.
    ///
    /// Returns `None` for a source index beyond the known stream count.
    pub fn output_index(&self, role: SourceRole, source_index: usize) -> Option<usize> {
        match role {
            SourceRole::Video => self.video.get(source_index).copied(),
            SourceRole::Audio => self.audio.get(source_index).copied(),
        }
    }

    /// Number of source streams mapped for one role
    pub fn source_count(&self, role: SourceRole) -> usize {
        match role {
            SourceRole::Video => self.video.len(),
            SourceRole::Audio => self.audio.len(),
        }
    }

    /// Total number of output streams recorded
    pub fn output_count(&self) -> usize {
        self.video.len() + self.audio.len()
    }
}

/// Build the full output stream table for both inputs.
///
/// The video container's streams are enumerated fully before the audio
/// container's, which fixes the output index ranges. Incompatible streams get
/// a transcode session, returned keyed by output stream index for the pump.
pub fn build_stream_table(
    video_in: &format::context::Input,
    audio_in: &format::context::Input,
    output: &mut format::context::Output,
) -> MergeResult<(StreamMapping, HashMap<usize, TranscodeSession>)> {
    let mut mapping = StreamMapping::default();
    let mut sessions = HashMap::new();

    add_streams_from(video_in, SourceRole::Video, output, &mut mapping, &mut sessions)?;
    add_streams_from(audio_in, SourceRole::Audio, output, &mut mapping, &mut sessions)?;

    debug!(
        output_streams = mapping.output_count(),
        transcoded = sessions.len(),
        "output stream table built"
    );

    Ok((mapping, sessions))
}

fn add_streams_from(
    input: &format::context::Input,
    role: SourceRole,
    output: &mut format::context::Output,
    mapping: &mut StreamMapping,
    sessions: &mut HashMap<usize, TranscodeSession>,
) -> MergeResult<()> {
    for ist in input.streams() {
        let codec_id = ist.parameters().id();

        match compat::classify(codec_id, output) {
            Compatibility::Compatible => {
                let mut ost = output
                    .add_stream(codec::encoder::find(Id::None))
                    .map_err(|e| MergeError::StreamCreationError {
                        message: format!("{} stream {}: {}", role.label(), ist.index(), e),
                    })?;

                ost.set_parameters(ist.parameters());
                // The output format negotiates its own tag for the codec.
                unsafe {
                    (*ost.parameters().as_mut_ptr()).codec_tag = 0;
                }
                ost.set_time_base(ist.time_base());

                trace!(
                    role = role.label(),
                    source = ist.index(),
                    output = ost.index(),
                    codec = ?codec_id,
                    "stream copied"
                );
                mapping.record(role, ost.index());
            }
            Compatibility::RequiresTranscode => {
                let encoder = transcode::resolve_encoder(ist.parameters().medium())?;
                let mut ost = output.add_stream(encoder).map_err(|e| {
                    MergeError::StreamCreationError {
                        message: format!("{} stream {}: {}", role.label(), ist.index(), e),
                    }
                })?;

                let session = TranscodeSession::open(&ist, &mut ost, encoder)?;

                debug!(
                    role = role.label(),
                    source = ist.index(),
                    output = ost.index(),
                    from = ?codec_id,
                    to = encoder.name(),
                    "stream set up for transcode"
                );
                mapping.record(role, ost.index());
                sessions.insert(ost.index(), session);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_streams_take_the_low_range() {
        let mut mapping = StreamMapping::default();
        // Two video streams first, then two audio streams, the order the
        // table builder assigns output slots in.
        mapping.record(SourceRole::Video, 0);
        mapping.record(SourceRole::Video, 1);
        mapping.record(SourceRole::Audio, 2);
        mapping.record(SourceRole::Audio, 3);

        assert_eq!(mapping.output_index(SourceRole::Video, 0), Some(0));
        assert_eq!(mapping.output_index(SourceRole::Video, 1), Some(1));
        assert_eq!(mapping.output_index(SourceRole::Audio, 0), Some(2));
        assert_eq!(mapping.output_index(SourceRole::Audio, 1), Some(3));
        assert_eq!(mapping.output_count(), 4);
    }

    #[test]
    fn out_of_range_source_index_is_unmapped() {
        let mut mapping = StreamMapping::default();
        mapping.record(SourceRole::Video, 0);

        assert_eq!(mapping.output_index(SourceRole::Video, 1), None);
        assert_eq!(mapping.output_index(SourceRole::Audio, 0), None);
    }

    #[test]
    fn single_stream_pair_maps_to_indices_zero_and_one() {
        let mut mapping = StreamMapping::default();
        mapping.record(SourceRole::Video, 0);
        mapping.record(SourceRole::Audio, 1);

        assert_eq!(mapping.output_index(SourceRole::Video, 0), Some(0));
        assert_eq!(mapping.output_index(SourceRole::Audio, 0), Some(1));
        assert_eq!(mapping.source_count(SourceRole::Video), 1);
        assert_eq!(mapping.source_count(SourceRole::Audio), 1);
    }
}
