//! Batch builder for the composition command stream.
//!
//! The writer owns one batch: a [`CmdStreamHeader`] followed by packets. Fixed-size packets are
//! appended whole with [`CommandWriter::send_command`]; variable-size packets are framed with
//! [`CommandWriter::begin_command`], any number of [`CommandWriter::append_command_data`] calls and
//! [`CommandWriter::end_command`]. A batch only becomes visible to the remote side through
//! [`CommandWriter::finish`], so an open command can never be observed half-written.
//!
//! Framing misuse is a caller bug and panics.

use crate::command::{decode_cmd_hdr_le, CmdHdr, CmdStreamHeader, VELLUM_ABI_VERSION_U32, VELLUM_CMD_STREAM_MAGIC};

fn align_up(v: usize, a: usize) -> usize {
    debug_assert!(a.is_power_of_two());
    (v + (a - 1)) & !(a - 1)
}

#[derive(Debug, Clone, Copy)]
struct OpenCommand {
    start: usize,
    declared_trailing: usize,
    appended: usize,
    size_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct CommandWriter {
    buf: Vec<u8>,
    open: Option<OpenCommand>,
    packets: usize,
}

impl Default for CommandWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandWriter {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut w = Self {
            buf: Vec::with_capacity(capacity.max(CmdStreamHeader::SIZE_BYTES)),
            open: None,
            packets: 0,
        };
        w.reset();
        w
    }

    pub fn reset(&mut self) {
        assert!(self.open.is_none(), "reset with a command still open");
        self.buf.clear();
        self.buf.resize(CmdStreamHeader::SIZE_BYTES, 0);
        self.packets = 0;

        self.write_u32_at(0, VELLUM_CMD_STREAM_MAGIC);
        self.write_u32_at(4, VELLUM_ABI_VERSION_U32);
        self.write_u32_at(8, CmdStreamHeader::SIZE_BYTES as u32);
        self.write_u32_at(12, 0);
    }

    /// Seals the batch and returns its bytes with the stream `size_bytes` filled in.
    pub fn finish(mut self) -> Vec<u8> {
        self.seal();
        self.buf
    }

    /// Seals the current batch, returns it and starts a fresh one in place.
    pub fn take_batch(&mut self) -> Vec<u8> {
        self.seal();
        let capacity = self.buf.capacity();
        let batch = std::mem::replace(&mut self.buf, Vec::with_capacity(capacity));
        self.reset();
        batch
    }

    fn seal(&mut self) {
        assert!(self.open.is_none(), "batch sealed with a command still open");
        assert!(
            self.buf.len() <= u32::MAX as usize,
            "command stream too large for u32 size_bytes"
        );
        let len = self.buf.len() as u32;
        self.write_u32_at(8, len);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() <= CmdStreamHeader::SIZE_BYTES
    }

    pub fn packet_count(&self) -> usize {
        self.packets
    }

    pub fn is_command_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn write_u32_at(&mut self, offset: usize, v: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Appends one complete packet. The packet's own header must describe exactly `packet`.
    pub fn send_command(&mut self, packet: &[u8]) {
        assert!(self.open.is_none(), "send_command while a command is open");
        let hdr = match decode_cmd_hdr_le(packet) {
            Ok(hdr) => hdr,
            Err(err) => panic!("malformed packet header: {err}"),
        };
        assert_eq!(
            hdr.size_bytes as usize,
            packet.len(),
            "packet size_bytes does not match packet length"
        );
        self.buf.extend_from_slice(packet);
        self.packets += 1;
    }

    /// Starts a variable-size packet: `fixed` is the header plus fixed fields, and exactly
    /// `trailing_size` bytes must follow through [`Self::append_command_data`].
    pub fn begin_command(&mut self, fixed: &[u8], trailing_size: usize) {
        assert!(self.open.is_none(), "begin_command while a command is open");
        assert!(
            fixed.len() >= CmdHdr::SIZE_BYTES,
            "fixed part shorter than the packet header"
        );
        let size_bytes = align_up(fixed.len() + trailing_size, 4);
        assert!(
            size_bytes <= u32::MAX as usize,
            "command packet too large for u32 size_bytes"
        );

        let start = self.buf.len();
        self.buf.extend_from_slice(fixed);
        self.write_u32_at(start + 4, size_bytes as u32);
        self.open = Some(OpenCommand {
            start,
            declared_trailing: trailing_size,
            appended: 0,
            size_bytes,
        });
    }

    pub fn append_command_data(&mut self, data: &[u8]) {
        let Some(open) = self.open.as_mut() else {
            panic!("append_command_data without begin_command");
        };
        assert!(
            open.appended + data.len() <= open.declared_trailing,
            "appended {} bytes past the declared trailing size {}",
            open.appended + data.len(),
            open.declared_trailing
        );
        open.appended += data.len();
        self.buf.extend_from_slice(data);
    }

    pub fn end_command(&mut self) {
        let Some(open) = self.open.take() else {
            panic!("end_command without begin_command");
        };
        assert_eq!(
            open.appended, open.declared_trailing,
            "trailing bytes appended do not match the declared size"
        );
        self.buf.resize(open.start + open.size_bytes, 0);
        self.packets += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{decode_cmd_stream_le, CmdOpcode, ResourceHandle, VcmdDashStyleUpdate};

    fn dash_fixed(count: usize) -> Vec<u8> {
        VcmdDashStyleUpdate {
            handle: ResourceHandle(1),
            offset_animations: ResourceHandle::NULL,
            offset: 0.0,
            dashes_size_bytes: (count * 8) as u32,
        }
        .encode_fixed_le()
    }

    #[test]
    fn empty_writer_has_only_stream_header() {
        let w = CommandWriter::new();
        assert!(w.is_empty());
        let buf = w.finish();
        assert_eq!(buf.len(), CmdStreamHeader::SIZE_BYTES);
        let (hdr, packets) = decode_cmd_stream_le(&buf).unwrap();
        assert_eq!(hdr.size_bytes as usize, buf.len());
        assert!(packets.is_empty());
    }

    #[test]
    fn variable_command_is_framed_and_padded() {
        let mut w = CommandWriter::new();
        w.begin_command(&dash_fixed(2), 16);
        w.append_command_data(&1.5f64.to_le_bytes());
        w.append_command_data(&2.5f64.to_le_bytes());
        w.end_command();
        assert_eq!(w.packet_count(), 1);

        let buf = w.finish();
        let (_, packets) = decode_cmd_stream_le(&buf).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].opcode, Some(CmdOpcode::DashStyleUpdate));
        let (fixed, dashes) = VcmdDashStyleUpdate::decode_le(packets[0].bytes).unwrap();
        assert_eq!(fixed.dashes_size_bytes, 16);
        assert_eq!(dashes, vec![1.5, 2.5]);
    }

    #[test]
    fn take_batch_starts_a_new_stream() {
        let mut w = CommandWriter::new();
        w.begin_command(&dash_fixed(0), 0);
        w.end_command();
        let first = w.take_batch();
        assert!(w.is_empty());
        assert_eq!(w.packet_count(), 0);
        assert_eq!(
            u32::from_le_bytes(first[8..12].try_into().unwrap()) as usize,
            first.len()
        );
    }

    #[test]
    #[should_panic(expected = "do not match the declared size")]
    fn short_trailing_data_panics() {
        let mut w = CommandWriter::new();
        w.begin_command(&dash_fixed(2), 16);
        w.append_command_data(&1.0f64.to_le_bytes());
        w.end_command();
    }

    #[test]
    #[should_panic(expected = "past the declared trailing size")]
    fn overlong_trailing_data_panics() {
        let mut w = CommandWriter::new();
        w.begin_command(&dash_fixed(1), 8);
        w.append_command_data(&[0u8; 12]);
    }

    #[test]
    #[should_panic(expected = "still open")]
    fn finishing_with_open_command_panics() {
        let mut w = CommandWriter::new();
        w.begin_command(&dash_fixed(1), 8);
        let _ = w.finish();
    }

    #[test]
    #[should_panic(expected = "does not match packet length")]
    fn send_command_validates_size() {
        let mut w = CommandWriter::new();
        let mut packet = vec![0u8; 16];
        packet[4..8].copy_from_slice(&8u32.to_le_bytes());
        w.send_command(&packet);
    }
}
