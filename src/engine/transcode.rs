//! Transcode session setup and per-packet decode/re-encode
//!
//! A session pairs an opened decoder with an opened encoder for one stream
//! whose codec the output container cannot carry. Sessions are retained for
//! the whole merge, keyed by output stream index, and every packet on the
//! stream is decoded to raw frames and re-encoded; rescaling timestamps alone
//! is not enough when the codec changes.

use ffmpeg_next::codec::{self, Codec, Id};
use ffmpeg_next::format::stream::{Stream, StreamMut};
use ffmpeg_next::format::{self, Pixel, Sample};
use ffmpeg_next::{decoder, encoder, ffi, frame, media, Dictionary, Frame, Packet, Rational};
use tracing::debug;

use crate::error::{MergeError, MergeResult};

/// Video codecs tried in order when the source codec must be replaced
const VIDEO_CODEC_PREFERENCE: &[Id] = &[Id::H264, Id::HEVC, Id::VP9, Id::MPEG4];

/// Audio codecs tried in order when the source codec must be replaced
const AUDIO_CODEC_PREFERENCE: &[Id] = &[Id::AAC, Id::MP3, Id::OPUS, Id::FLAC];

/// Bit rate used when the source does not report one
const DEFAULT_VIDEO_BIT_RATE: usize = 2_000_000;
const DEFAULT_AUDIO_BIT_RATE: usize = 128_000;

const DEFAULT_GOP_SIZE: u32 = 12;
const DEFAULT_MAX_B_FRAMES: usize = 2;

/// Sample rate used when the source reports none
const DEFAULT_SAMPLE_RATE: i32 = 48_000;

/// x264 speed/quality preset applied when H.264 is the chosen codec
const H264_PRESET: &str = "fast";

/// Pick the first codec of `preference` for which `available` holds.
fn select_codec<F>(preference: &[Id], mut available: F) -> Option<Id>
where
    F: FnMut(Id) -> bool,
{
    preference.iter().copied().find(|id| available(*id))
}

/// Clamp a reported channel count to something an encoder accepts.
///
/// Sources occasionally report zero channels; stereo is the fallback.
fn effective_channel_count(reported: i32) -> i32 {
    if reported > 0 {
        reported
    } else {
        2
    }
}

/// Resolve the replacement encoder for a stream of the given media kind.
pub fn resolve_encoder(medium: media::Type) -> MergeResult<Codec> {
    let preference = match medium {
        media::Type::Video => VIDEO_CODEC_PREFERENCE,
        media::Type::Audio => AUDIO_CODEC_PREFERENCE,
        other => {
            return Err(MergeError::CodecResolutionError {
                message: format!("no encoder policy for {:?} streams", other),
            })
        }
    };

    select_codec(preference, |id| codec::encoder::find(id).is_some())
        .and_then(codec::encoder::find)
        .ok_or_else(|| MergeError::CodecResolutionError {
            message: format!("no encoder available from preference list {:?}", preference),
        })
}

/// One stream's decoder/encoder pair, alive for the whole merge
pub struct TranscodeSession {
    output_index: usize,
    input_time_base: Rational,
    encoder_time_base: Rational,
    codecs: CodecPair,
}

enum CodecPair {
    Video {
        decoder: decoder::Video,
        encoder: encoder::video::Encoder,
    },
    Audio {
        decoder: decoder::Audio,
        encoder: encoder::audio::Encoder,
    },
}

impl TranscodeSession {
    /// Open decoder and encoder for one incompatible input stream and stamp
    /// the freshly allocated output stream with the encoder's parameters.
    pub fn open(ist: &Stream, ost: &mut StreamMut, codec: Codec) -> MergeResult<Self> {
        match ist.parameters().medium() {
            media::Type::Video => Self::open_video(ist, ost, codec),
            media::Type::Audio => Self::open_audio(ist, ost, codec),
            other => Err(MergeError::CodecResolutionError {
                message: format!("cannot transcode {:?} stream {}", other, ist.index()),
            }),
        }
    }

    fn open_video(ist: &Stream, ost: &mut StreamMut, codec: Codec) -> MergeResult<Self> {
        let decoder = open_decoder(ist)?
            .video()
            .map_err(|e| decoder_error(ist, e))?;

        let mut enc = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| MergeError::CodecOpenError {
                message: format!("allocating {} encoder: {}", codec.name(), e),
            })?;

        enc.set_width(decoder.width());
        enc.set_height(decoder.height());
        enc.set_aspect_ratio(decoder.aspect_ratio());

        // First format the encoder advertises, or 4:2:0 planar if it lists none.
        let pixel_format = codec
            .video()
            .ok()
            .and_then(|caps| caps.formats().and_then(|mut formats| formats.next()))
            .unwrap_or(Pixel::YUV420P);
        enc.set_format(pixel_format);

        let source_bit_rate = unsafe { (*ist.parameters().as_ptr()).bit_rate };
        enc.set_bit_rate(if source_bit_rate > 0 {
            source_bit_rate as usize
        } else {
            DEFAULT_VIDEO_BIT_RATE
        });
        enc.set_gop(DEFAULT_GOP_SIZE);
        enc.set_max_b_frames(DEFAULT_MAX_B_FRAMES);

        let frame_rate = decoder.frame_rate().unwrap_or_else(|| Rational::new(25, 1));
        let encoder_time_base = Rational::new(frame_rate.denominator(), frame_rate.numerator());
        enc.set_frame_rate(Some(frame_rate));
        enc.set_time_base(encoder_time_base);

        let opened = if codec.id() == Id::H264 {
            let mut options = Dictionary::new();
            options.set("preset", H264_PRESET);
            enc.open_as_with(codec, options)
        } else {
            enc.open_as(codec)
        }
        .map_err(|e| MergeError::CodecOpenError {
            message: format!("opening {} encoder: {}", codec.name(), e),
        })?;

        stamp_output_stream(ost, &opened, encoder_time_base)?;

        debug!(
            encoder = codec.name(),
            width = decoder.width(),
            height = decoder.height(),
            pixel_format = ?pixel_format,
            "video transcode session opened"
        );

        Ok(Self {
            output_index: ost.index(),
            input_time_base: ist.time_base(),
            encoder_time_base,
            codecs: CodecPair::Video {
                decoder,
                encoder: opened,
            },
        })
    }

    fn open_audio(ist: &Stream, ost: &mut StreamMut, codec: Codec) -> MergeResult<Self> {
        let decoder = open_decoder(ist)?
            .audio()
            .map_err(|e| decoder_error(ist, e))?;

        let mut enc = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| MergeError::CodecOpenError {
                message: format!("allocating {} encoder: {}", codec.name(), e),
            })?;

        let sample_rate = if decoder.rate() > 0 {
            decoder.rate() as i32
        } else {
            DEFAULT_SAMPLE_RATE
        };
        enc.set_rate(sample_rate);

        // First format the encoder advertises, or planar float if it lists none.
        let sample_format = codec
            .audio()
            .ok()
            .and_then(|caps| caps.formats().and_then(|mut formats| formats.next()))
            .unwrap_or(Sample::F32(format::sample::Type::Planar));
        enc.set_format(sample_format);

        let source_bit_rate = unsafe { (*ist.parameters().as_ptr()).bit_rate };
        enc.set_bit_rate(if source_bit_rate > 0 {
            source_bit_rate as usize
        } else {
            DEFAULT_AUDIO_BIT_RATE
        });

        let encoder_time_base = Rational::new(1, sample_rate);
        unsafe {
            // The audio builder exposes no time-base setter; the channel
            // layout is derived from the source count, stereo when the source
            // reports none.
            let channels = effective_channel_count((*decoder.as_ptr()).ch_layout.nb_channels);
            ffi::av_channel_layout_default(&mut (*enc.as_mut_ptr()).ch_layout, channels);
            (*enc.as_mut_ptr()).time_base = encoder_time_base.into();
        }

        let opened = enc.open_as(codec).map_err(|e| MergeError::CodecOpenError {
            message: format!("opening {} encoder: {}", codec.name(), e),
        })?;

        stamp_output_stream(ost, &opened, encoder_time_base)?;

        debug!(
            encoder = codec.name(),
            sample_rate,
            "audio transcode session opened"
        );

        Ok(Self {
            output_index: ost.index(),
            input_time_base: ist.time_base(),
            encoder_time_base,
            codecs: CodecPair::Audio {
                decoder,
                encoder: opened,
            },
        })
    }

    /// Decode one packet and write every re-encoded packet it produces.
    pub fn transcode_packet(
        &mut self,
        packet: &Packet,
        output: &mut format::context::Output,
    ) -> MergeResult<()> {
        let input_time_base = self.input_time_base;
        let encoder_time_base = self.encoder_time_base;
        let output_index = self.output_index;

        match &mut self.codecs {
            CodecPair::Video { decoder, encoder } => {
                decoder.send_packet(packet).map_err(|e| MergeError::TranscodeError {
                    message: format!("sending packet to video decoder: {}", e),
                })?;

                let mut decoded = frame::Video::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    rescale_frame_pts(&mut decoded, input_time_base, encoder_time_base);
                    encoder.send_frame(&decoded).map_err(|e| MergeError::TranscodeError {
                        message: format!("sending frame to video encoder: {}", e),
                    })?;

                    let mut encoded = Packet::empty();
                    while encoder.receive_packet(&mut encoded).is_ok() {
                        write_encoded(&mut encoded, output_index, encoder_time_base, output)?;
                    }
                }
            }
            CodecPair::Audio { decoder, encoder } => {
                decoder.send_packet(packet).map_err(|e| MergeError::TranscodeError {
                    message: format!("sending packet to audio decoder: {}", e),
                })?;

                // TODO: buffer decoded samples through an audio FIFO so
                // fixed-frame-size encoders (AAC) accept arbitrary decoder
                // frame sizes.
                let mut decoded = frame::Audio::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    rescale_frame_pts(&mut decoded, input_time_base, encoder_time_base);
                    encoder.send_frame(&decoded).map_err(|e| MergeError::TranscodeError {
                        message: format!("sending frame to audio encoder: {}", e),
                    })?;

                    let mut encoded = Packet::empty();
                    while encoder.receive_packet(&mut encoded).is_ok() {
                        write_encoded(&mut encoded, output_index, encoder_time_base, output)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Drain both codecs at end of stream and write the remaining packets.
    pub fn flush(&mut self, output: &mut format::context::Output) -> MergeResult<()> {
        let input_time_base = self.input_time_base;
        let encoder_time_base = self.encoder_time_base;
        let output_index = self.output_index;

        match &mut self.codecs {
            CodecPair::Video { decoder, encoder } => {
                decoder.send_eof().map_err(|e| MergeError::TranscodeError {
                    message: format!("flushing video decoder: {}", e),
                })?;
                let mut decoded = frame::Video::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    rescale_frame_pts(&mut decoded, input_time_base, encoder_time_base);
                    encoder.send_frame(&decoded).map_err(|e| MergeError::TranscodeError {
                        message: format!("sending frame to video encoder: {}", e),
                    })?;
                }

                encoder.send_eof().map_err(|e| MergeError::TranscodeError {
                    message: format!("flushing video encoder: {}", e),
                })?;
                let mut encoded = Packet::empty();
                while encoder.receive_packet(&mut encoded).is_ok() {
                    write_encoded(&mut encoded, output_index, encoder_time_base, output)?;
                }
            }
            CodecPair::Audio { decoder, encoder } => {
                decoder.send_eof().map_err(|e| MergeError::TranscodeError {
                    message: format!("flushing audio decoder: {}", e),
                })?;
                let mut decoded = frame::Audio::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    rescale_frame_pts(&mut decoded, input_time_base, encoder_time_base);
                    encoder.send_frame(&decoded).map_err(|e| MergeError::TranscodeError {
                        message: format!("sending frame to audio encoder: {}", e),
                    })?;
                }

                encoder.send_eof().map_err(|e| MergeError::TranscodeError {
                    message: format!("flushing audio encoder: {}", e),
                })?;
                let mut encoded = Packet::empty();
                while encoder.receive_packet(&mut encoded).is_ok() {
                    write_encoded(&mut encoded, output_index, encoder_time_base, output)?;
                }
            }
        }

        Ok(())
    }

    /// Output stream index this session encodes for
    pub fn output_index(&self) -> usize {
        self.output_index
    }
}

/// Allocate the decoder context matching one input stream's parameters.
fn open_decoder(ist: &Stream) -> MergeResult<decoder::Decoder> {
    let context = codec::context::Context::from_parameters(ist.parameters()).map_err(|e| {
        MergeError::CodecOpenError {
            message: format!("decoder context for stream {}: {}", ist.index(), e),
        }
    })?;

    Ok(context.decoder())
}

/// A missing decoder is a resolution failure; anything else failed to open.
fn decoder_error(ist: &Stream, e: ffmpeg_next::Error) -> MergeError {
    match e {
        ffmpeg_next::Error::DecoderNotFound => MergeError::CodecResolutionError {
            message: format!("no decoder for {:?} (stream {})", ist.parameters().id(), ist.index()),
        },
        e => MergeError::CodecOpenError {
            message: format!("decoder for stream {}: {}", ist.index(), e),
        },
    }
}

/// Copy the opened encoder's parameters and time base onto the output stream.
fn stamp_output_stream(
    ost: &mut StreamMut,
    encoder: &codec::context::Context,
    time_base: Rational,
) -> MergeResult<()> {
    ost.set_time_base(time_base);

    // StreamMut::set_parameters wants an AVCodecParameters source, so the
    // opened context is exported through the FFI call directly.
    unsafe {
        let ret = ffi::avcodec_parameters_from_context(
            (*ost.as_mut_ptr()).codecpar,
            encoder.as_ptr() as *mut ffi::AVCodecContext,
        );
        if ret < 0 {
            return Err(MergeError::CodecOpenError {
                message: format!("exporting encoder parameters failed ({})", ret),
            });
        }
        (*(*ost.as_mut_ptr()).codecpar).codec_tag = 0;
    }

    Ok(())
}

/// Move a decoded frame's timestamp into the encoder's time base.
fn rescale_frame_pts(frame: &mut Frame, from: Rational, to: Rational) {
    if let Some(pts) = frame.pts() {
        let rescaled = unsafe { ffi::av_rescale_q(pts, from.into(), to.into()) };
        frame.set_pts(Some(rescaled));
    }
}

/// Stamp an encoded packet for its output stream and hand it to the muxer.
fn write_encoded(
    packet: &mut Packet,
    output_index: usize,
    encoder_time_base: Rational,
    output: &mut format::context::Output,
) -> MergeResult<()> {
    let destination_time_base = output
        .stream(output_index)
        .map(|s| s.time_base())
        .ok_or_else(|| MergeError::PacketWriteError {
            message: format!("output stream {} missing", output_index),
        })?;

    packet.set_stream(output_index);
    packet.rescale_ts(encoder_time_base, destination_time_base);
    packet.set_position(-1);
    packet
        .write_interleaved(output)
        .map_err(|e| MergeError::PacketWriteError {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_codec_wins_when_available() {
        let selected = select_codec(VIDEO_CODEC_PREFERENCE, |_| true);
        assert_eq!(selected, Some(Id::H264));
    }

    #[test]
    fn selection_falls_back_down_the_list() {
        let selected = select_codec(VIDEO_CODEC_PREFERENCE, |id| id == Id::MPEG4);
        assert_eq!(selected, Some(Id::MPEG4));
    }

    #[test]
    fn selection_fails_when_nothing_is_available() {
        assert_eq!(select_codec(AUDIO_CODEC_PREFERENCE, |_| false), None);
    }

    #[test]
    fn audio_preference_starts_with_aac() {
        assert_eq!(AUDIO_CODEC_PREFERENCE.first(), Some(&Id::AAC));
    }

    #[test]
    fn zero_channel_sources_default_to_stereo() {
        assert_eq!(effective_channel_count(0), 2);
        assert_eq!(effective_channel_count(-3), 2);
        assert_eq!(effective_channel_count(1), 1);
        assert_eq!(effective_channel_count(6), 6);
    }
}
