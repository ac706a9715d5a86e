//! Stream compatibility classification
//!
//! Decides whether a source stream's codec can be carried by the output
//! container unmodified, or has to go through a decode/re-encode cycle.

use ffmpeg_next::codec;
use ffmpeg_next::ffi;
use ffmpeg_next::format;

/// Verdict for one (codec, destination format) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Codec parameters can be copied into the output container as-is
    Compatible,
    /// Destination format cannot carry the codec; re-encode required
    RequiresTranscode,
}

impl Compatibility {
    /// Whether the verdict allows a direct stream copy
    pub fn is_copyable(&self) -> bool {
        matches!(self, Compatibility::Compatible)
    }
}

/// Classify one source codec against the output container's format.
///
/// The muxer's own compliance query is authoritative; a non-zero entry in
/// the format's private codec-tag table also counts as supported, since the
/// muxer can then tag the stream itself. Everything else needs a transcode.
pub fn classify(codec_id: codec::Id, output: &format::context::Output) -> Compatibility {
    unsafe {
        let oformat = (*output.as_ptr()).oformat;
        if oformat.is_null() {
            return Compatibility::RequiresTranscode;
        }

        let id: ffi::AVCodecID = codec_id.into();

        if ffi::avformat_query_codec(oformat, id, ffi::FF_COMPLIANCE_NORMAL as i32) == 1 {
            return Compatibility::Compatible;
        }

        let tags = (*oformat).codec_tag;
        if !tags.is_null() && ffi::av_codec_get_tag(tags, id) != 0 {
            return Compatibility::Compatible;
        }
    }

    Compatibility::RequiresTranscode
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copyable_matches_verdict() {
        assert!(Compatibility::Compatible.is_copyable());
        assert!(!Compatibility::RequiresTranscode.is_copyable());
    }
}
