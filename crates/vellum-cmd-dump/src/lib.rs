//! Human-readable dump of recorded channel batches.
//!
//! A recording is one or more command streams back to back, exactly as a channel commits them.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::io::{self, Write};

use vellum_protocol::command::{
    decode_cmd_stream_header_le, CmdPacket, CmdStreamHeader, CmdStreamIter, VcmdCreateResource,
    VcmdDashStyleUpdate, VcmdReleaseResource, VcmdRotateTransformUpdate,
    VcmdScaleTransformUpdate, VcmdSolidColorBrushUpdate, VcmdTransformGroupUpdate,
    VcmdTranslateTransformUpdate,
};
use vellum_protocol::{CmdOpcode, DecodeError, ResourceHandle};

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("batch at offset {offset}: {source}")]
    Batch { offset: usize, source: DecodeError },

    #[error("packet at offset {offset}: {source}")]
    Packet { offset: usize, source: DecodeError },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Totals over everything dumped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub batches: usize,
    pub packets: usize,
    /// Packet count per raw opcode, unknown opcodes included.
    pub per_opcode: BTreeMap<u32, usize>,
}

impl DumpSummary {
    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{} batches, {} packets", self.batches, self.packets)?;
        for (&opcode, count) in &self.per_opcode {
            match CmdOpcode::from_u32(opcode) {
                Some(known) => writeln!(out, "  {known:?}: {count}")?,
                None => writeln!(out, "  0x{opcode:x}: {count}")?,
            }
        }
        Ok(())
    }
}

/// Writes one line per batch and one indented line per packet. Offsets are relative to the
/// start of `buf`.
///
/// With `keep_going`, a malformed packet is reported inline and the rest of its batch skipped;
/// otherwise the first decode error is returned.
pub fn dump(buf: &[u8], out: &mut dyn Write, keep_going: bool) -> Result<DumpSummary, DumpError> {
    let mut summary = DumpSummary::default();
    let mut offset = 0usize;

    while offset < buf.len() {
        let batch = &buf[offset..];
        let header = decode_cmd_stream_header_le(batch)
            .map_err(|source| DumpError::Batch { offset, source })?;
        let iter =
            CmdStreamIter::new(batch).map_err(|source| DumpError::Batch { offset, source })?;
        write_batch_line(out, summary.batches, offset, &header)?;
        summary.batches += 1;

        let mut packet_offset = offset + CmdStreamHeader::SIZE_BYTES;
        for packet in iter {
            let described = packet.and_then(|packet| {
                describe_packet(&packet).map(|line| (line, packet.hdr.opcode, packet.bytes.len()))
            });
            match described {
                Ok((line, opcode, len)) => {
                    writeln!(out, "  +{:<6} {line}", packet_offset - offset)?;
                    *summary.per_opcode.entry(opcode).or_default() += 1;
                    summary.packets += 1;
                    packet_offset += len;
                }
                Err(source) if keep_going => {
                    tracing::warn!(offset = packet_offset, %source, "skipping rest of batch");
                    writeln!(out, "  +{:<6} error: {source}", packet_offset - offset)?;
                    break;
                }
                Err(source) => {
                    return Err(DumpError::Packet {
                        offset: packet_offset,
                        source,
                    })
                }
            }
        }

        // `decode_cmd_stream_header_le` rejects sizes smaller than the header, so this advances.
        offset += header.size_bytes as usize;
    }

    Ok(summary)
}

fn write_batch_line(
    out: &mut dyn Write,
    index: usize,
    offset: usize,
    header: &CmdStreamHeader,
) -> io::Result<()> {
    writeln!(
        out,
        "batch {index} @{offset}: abi {}.{}, {} bytes, flags 0x{:x}",
        header.abi_version >> 16,
        header.abi_version & 0xffff,
        header.size_bytes,
        header.flags
    )
}

fn value(v: f64, animation: ResourceHandle) -> String {
    if animation.is_null() {
        format!("{v}")
    } else {
        format!("anim({animation})")
    }
}

/// One-line description of a packet. Unknown opcodes are described, not rejected.
pub fn describe_packet(packet: &CmdPacket<'_>) -> Result<String, DecodeError> {
    let Some(opcode) = packet.opcode else {
        return Ok(format!(
            "unknown opcode 0x{:x} ({} bytes)",
            packet.hdr.opcode, packet.hdr.size_bytes
        ));
    };
    let bytes = packet.bytes;

    Ok(match opcode {
        CmdOpcode::Nop => "Nop".to_string(),
        CmdOpcode::CreateResource => {
            let cmd = VcmdCreateResource::decode_le(bytes)?;
            format!("CreateResource {} {:?}", cmd.handle, cmd.resource_type)
        }
        CmdOpcode::ReleaseResource => {
            let cmd = VcmdReleaseResource::decode_le(bytes)?;
            format!("ReleaseResource {} {:?}", cmd.handle, cmd.resource_type)
        }
        CmdOpcode::TranslateTransformUpdate => {
            let cmd = VcmdTranslateTransformUpdate::decode_le(bytes)?;
            format!(
                "TranslateTransform {} x={} y={}",
                cmd.handle,
                value(cmd.x, cmd.x_animations),
                value(cmd.y, cmd.y_animations)
            )
        }
        CmdOpcode::ScaleTransformUpdate => {
            let cmd = VcmdScaleTransformUpdate::decode_le(bytes)?;
            format!(
                "ScaleTransform {} scale=({}, {}) center=({}, {})",
                cmd.handle,
                value(cmd.scale_x, cmd.scale_x_animations),
                value(cmd.scale_y, cmd.scale_y_animations),
                value(cmd.center_x, cmd.center_x_animations),
                value(cmd.center_y, cmd.center_y_animations)
            )
        }
        CmdOpcode::RotateTransformUpdate => {
            let cmd = VcmdRotateTransformUpdate::decode_le(bytes)?;
            format!(
                "RotateTransform {} angle={} center=({}, {})",
                cmd.handle,
                value(cmd.angle, cmd.angle_animations),
                value(cmd.center_x, cmd.center_x_animations),
                value(cmd.center_y, cmd.center_y_animations)
            )
        }
        CmdOpcode::TransformGroupUpdate => {
            let (cmd, children) = VcmdTransformGroupUpdate::decode_le(bytes)?;
            let children: Vec<String> = children.iter().map(ToString::to_string).collect();
            format!("TransformGroup {} children=[{}]", cmd.handle, children.join(", "))
        }
        CmdOpcode::SolidColorBrushUpdate => {
            let cmd = VcmdSolidColorBrushUpdate::decode_le(bytes)?;
            let color = if cmd.color_animations.is_null() {
                let [r, g, b, a] = cmd.color;
                format!("({r}, {g}, {b}, {a})")
            } else {
                format!("anim({})", cmd.color_animations)
            };
            format!(
                "SolidColorBrush {} color={color} opacity={} transform={} relative_transform={}",
                cmd.handle,
                value(cmd.opacity, cmd.opacity_animations),
                cmd.transform,
                cmd.relative_transform
            )
        }
        CmdOpcode::DashStyleUpdate => {
            let (cmd, dashes) = VcmdDashStyleUpdate::decode_le(bytes)?;
            let dashes: Vec<String> = dashes.iter().map(ToString::to_string).collect();
            format!(
                "DashStyle {} offset={} dashes=[{}]",
                cmd.handle,
                value(cmd.offset, cmd.offset_animations),
                dashes.join(", ")
            )
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_protocol::{CommandWriter, ResourceType};

    fn batch() -> Vec<u8> {
        let mut w = CommandWriter::new();
        w.send_command(
            &VcmdCreateResource {
                handle: ResourceHandle(3),
                resource_type: ResourceType::TranslateTransform,
            }
            .encode_le(),
        );
        w.send_command(
            &VcmdTranslateTransformUpdate {
                handle: ResourceHandle(3),
                x: 1.5,
                y: 0.0,
                x_animations: ResourceHandle::NULL,
                y_animations: ResourceHandle(9),
            }
            .encode_le(),
        );
        w.finish()
    }

    #[test]
    fn dumps_concatenated_batches() {
        let mut buf = batch();
        buf.extend_from_slice(&batch());

        let mut out = Vec::new();
        let summary = dump(&buf, &mut out, false).unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.packets, 4);
        assert_eq!(
            summary.per_opcode.get(&(CmdOpcode::CreateResource as u32)),
            Some(&2)
        );

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("CreateResource #3 TranslateTransform"));
        assert!(text.contains("TranslateTransform #3 x=1.5 y=anim(#9)"));
        assert!(text.contains("batch 1 @"));
    }

    #[test]
    fn unknown_opcode_is_described() {
        let mut w = CommandWriter::new();
        w.send_command(&[0xef, 0xbe, 0xad, 0xde, 12, 0, 0, 0, 1, 2, 3, 4]);
        let buf = w.finish();

        let mut out = Vec::new();
        let summary = dump(&buf, &mut out, false).unwrap();
        assert_eq!(summary.per_opcode.get(&0xdead_beef), Some(&1));
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("unknown opcode 0xdeadbeef (12 bytes)"));
    }

    #[test]
    fn corrupt_packet_fails_unless_keep_going() {
        let mut buf = batch();
        // Corrupt the resource type of the create packet.
        buf[CmdStreamHeader::SIZE_BYTES + 12] = 0x7f;

        let err = dump(&buf, &mut Vec::new(), false).unwrap_err();
        assert!(matches!(
            err,
            DumpError::Packet {
                source: DecodeError::UnknownResourceType(0x7f),
                ..
            }
        ));

        let mut out = Vec::new();
        let summary = dump(&buf, &mut out, true).unwrap();
        assert_eq!(summary.packets, 0);
        assert!(String::from_utf8(out).unwrap().contains("error: unknown resource type 127"));
    }
}
