//! Packet pump
//!
//! Drains one input container at a time into the output. Copied streams get
//! their timestamps rescaled and stream index remapped; transcoded streams go
//! through their session's decode/re-encode cycle. The output container's
//! interleaving writer takes care of ordering.

use std::collections::HashMap;

use ffmpeg_next::format;
use tracing::{debug, trace};

use crate::engine::table::{SourceRole, StreamMapping};
use crate::engine::transcode::TranscodeSession;
use crate::error::{MergeError, MergeResult};

/// Read every packet of `input` and write it into `output`.
///
/// Packets whose source stream has no mapping entry are dropped; that only
/// happens for stream indices beyond the count seen at table-build time.
pub fn drain_input(
    input: &mut format::context::Input,
    role: SourceRole,
    mapping: &StreamMapping,
    sessions: &mut HashMap<usize, TranscodeSession>,
    output: &mut format::context::Output,
) -> MergeResult<u64> {
    let mut written: u64 = 0;

    for (ist, mut packet) in input.packets() {
        let Some(output_index) = mapping.output_index(role, ist.index()) else {
            trace!(
                role = role.label(),
                source = ist.index(),
                "dropping packet from unmapped stream"
            );
            continue;
        };

        if let Some(session) = sessions.get_mut(&output_index) {
            session.transcode_packet(&packet, output)?;
        } else {
            let destination_time_base = output
                .stream(output_index)
                .map(|s| s.time_base())
                .ok_or_else(|| MergeError::PacketWriteError {
                    message: format!("output stream {} missing", output_index),
                })?;

            packet.set_stream(output_index);
            packet.rescale_ts(ist.time_base(), destination_time_base);
            // Byte offsets are meaningless in the new container.
            packet.set_position(-1);
            packet
                .write_interleaved(output)
                .map_err(|e| MergeError::PacketWriteError {
                    message: format!("{} packet for output stream {}: {}", role.label(), output_index, e),
                })?;
        }

        written += 1;
    }

    debug!(role = role.label(), packets = written, "input drained");
    Ok(written)
}

/// Flush every retained transcode session into the output.
pub fn flush_sessions(
    sessions: &mut HashMap<usize, TranscodeSession>,
    output: &mut format::context::Output,
) -> MergeResult<()> {
    // Deterministic flush order keeps repeated runs bit-identical.
    let mut indices: Vec<usize> = sessions.keys().copied().collect();
    indices.sort_unstable();

    for index in indices {
        if let Some(session) = sessions.get_mut(&index) {
            session.flush(output)?;
            trace!(output_stream = session.output_index(), "transcode session flushed");
        }
    }

    Ok(())
}
