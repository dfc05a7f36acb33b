//! Composition command stream layouts.
//!
//! A batch is a [`CmdStreamHeader`] followed by packets. Every packet starts with a [`CmdHdr`]
//! and is padded to a multiple of 4 bytes; `size_bytes` covers the header, the fixed fields, any
//! trailing payload and the padding. All integers and floats are little-endian.
//!
//! Fixed layouts keep `f64` fields 8-byte aligned relative to the packet start, which is why
//! several of them carry a `reserved0` word after the handle.

use core::fmt;

use thiserror::Error;

pub const VELLUM_CMD_STREAM_MAGIC: u32 = 0x444D_4356; // "VCMD" LE

pub const VELLUM_ABI_MAJOR: u16 = 1;
pub const VELLUM_ABI_MINOR: u16 = 0;
pub const VELLUM_ABI_VERSION_U32: u32 = ((VELLUM_ABI_MAJOR as u32) << 16) | VELLUM_ABI_MINOR as u32;

/// Opaque identifier for a resource registered on one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(pub u32);

impl ResourceHandle {
    pub const NULL: Self = Self(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    TranslateTransform = 1,
    ScaleTransform = 2,
    RotateTransform = 3,
    TransformGroup = 4,
    SolidColorBrush = 5,
    DashStyle = 6,
}

impl ResourceType {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::TranslateTransform),
            2 => Some(Self::ScaleTransform),
            3 => Some(Self::RotateTransform),
            4 => Some(Self::TransformGroup),
            5 => Some(Self::SolidColorBrush),
            6 => Some(Self::DashStyle),
            _ => None,
        }
    }

    /// Opcode of the command that carries this resource's full state.
    pub const fn update_opcode(self) -> CmdOpcode {
        match self {
            Self::TranslateTransform => CmdOpcode::TranslateTransformUpdate,
            Self::ScaleTransform => CmdOpcode::ScaleTransformUpdate,
            Self::RotateTransform => CmdOpcode::RotateTransformUpdate,
            Self::TransformGroup => CmdOpcode::TransformGroupUpdate,
            Self::SolidColorBrush => CmdOpcode::SolidColorBrushUpdate,
            Self::DashStyle => CmdOpcode::DashStyleUpdate,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmdOpcode {
    Nop = 0,

    CreateResource = 0x100,
    ReleaseResource = 0x101,

    TranslateTransformUpdate = 0x200,
    ScaleTransformUpdate = 0x201,
    RotateTransformUpdate = 0x202,
    TransformGroupUpdate = 0x203,

    SolidColorBrushUpdate = 0x300,
    DashStyleUpdate = 0x301,
}

impl CmdOpcode {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Nop),
            0x100 => Some(Self::CreateResource),
            0x101 => Some(Self::ReleaseResource),
            0x200 => Some(Self::TranslateTransformUpdate),
            0x201 => Some(Self::ScaleTransformUpdate),
            0x202 => Some(Self::RotateTransformUpdate),
            0x203 => Some(Self::TransformGroupUpdate),
            0x300 => Some(Self::SolidColorBrushUpdate),
            0x301 => Some(Self::DashStyleUpdate),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CmdStreamHeader {
    pub magic: u32,
    pub abi_version: u32,
    pub size_bytes: u32,
    pub flags: u32,
    pub reserved0: u32,
    pub reserved1: u32,
}

impl CmdStreamHeader {
    pub const SIZE_BYTES: usize = 24;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CmdHdr {
    pub opcode: u32,
    pub size_bytes: u32,
}

impl CmdHdr {
    pub const SIZE_BYTES: usize = 8;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("bad stream magic 0x{found:08x}")]
    BadMagic { found: u32 },
    #[error("unsupported abi major version {found}")]
    UnsupportedMajor { found: u16 },
    #[error("bad size_bytes {found}")]
    BadSizeBytes { found: u32 },
    #[error("size_bytes {found} is not 4-byte aligned")]
    SizeNotAligned { found: u32 },
    #[error("packet at offset {offset} ({packet_size_bytes} bytes) overruns stream of {stream_size_bytes} bytes")]
    PacketOverrunsStream {
        offset: u32,
        packet_size_bytes: u32,
        stream_size_bytes: u32,
    },
    #[error("unexpected opcode 0x{found:x} (expected {expected:?})")]
    UnexpectedOpcode { found: u32, expected: CmdOpcode },
    #[error("trailing payload of {found} bytes is not a multiple of {element_size}")]
    BadTrailingSize { found: u32, element_size: u32 },
    #[error("unknown resource type {0}")]
    UnknownResourceType(u32),
    #[error("count overflow")]
    CountOverflow,
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64_le(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub fn decode_cmd_stream_header_le(buf: &[u8]) -> Result<CmdStreamHeader, DecodeError> {
    if buf.len() < CmdStreamHeader::SIZE_BYTES {
        return Err(DecodeError::BufferTooSmall);
    }

    let hdr = CmdStreamHeader {
        magic: read_u32_le(buf, 0),
        abi_version: read_u32_le(buf, 4),
        size_bytes: read_u32_le(buf, 8),
        flags: read_u32_le(buf, 12),
        reserved0: read_u32_le(buf, 16),
        reserved1: read_u32_le(buf, 20),
    };

    if hdr.magic != VELLUM_CMD_STREAM_MAGIC {
        return Err(DecodeError::BadMagic { found: hdr.magic });
    }
    let major = (hdr.abi_version >> 16) as u16;
    if major != VELLUM_ABI_MAJOR {
        return Err(DecodeError::UnsupportedMajor { found: major });
    }
    if (hdr.size_bytes as usize) < CmdStreamHeader::SIZE_BYTES {
        return Err(DecodeError::BadSizeBytes {
            found: hdr.size_bytes,
        });
    }

    Ok(hdr)
}

pub fn decode_cmd_hdr_le(buf: &[u8]) -> Result<CmdHdr, DecodeError> {
    if buf.len() < CmdHdr::SIZE_BYTES {
        return Err(DecodeError::BufferTooSmall);
    }

    let opcode = read_u32_le(buf, 0);
    let size_bytes = read_u32_le(buf, 4);

    if size_bytes < CmdHdr::SIZE_BYTES as u32 {
        return Err(DecodeError::BadSizeBytes { found: size_bytes });
    }
    if size_bytes % 4 != 0 {
        return Err(DecodeError::SizeNotAligned { found: size_bytes });
    }

    Ok(CmdHdr { opcode, size_bytes })
}

/// Sequential little-endian field writer for one packet.
struct PacketEncoder {
    buf: Vec<u8>,
    size_bytes: usize,
}

impl PacketEncoder {
    fn new(opcode: CmdOpcode, size_bytes: usize) -> Self {
        debug_assert_eq!(size_bytes % 4, 0);
        let mut buf = Vec::with_capacity(size_bytes);
        buf.extend_from_slice(&(opcode as u32).to_le_bytes());
        buf.extend_from_slice(&(size_bytes as u32).to_le_bytes());
        Self { buf, size_bytes }
    }

    fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn handle(self, v: ResourceHandle) -> Self {
        self.u32(v.0)
    }

    fn f32(self, v: f32) -> Self {
        self.u32(v.to_bits())
    }

    fn f64(mut self, v: f64) -> Self {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
        self
    }

    fn finish(self) -> Vec<u8> {
        assert_eq!(
            self.buf.len(),
            self.size_bytes,
            "packet encoder wrote an unexpected number of bytes"
        );
        self.buf
    }
}

/// Sequential little-endian field reader over one validated packet.
struct PacketReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    /// Validates the packet header against `expected` and the fixed layout size.
    fn new(buf: &'a [u8], expected: CmdOpcode, fixed_size: usize) -> Result<Self, DecodeError> {
        let hdr = decode_cmd_hdr_le(buf)?;
        if hdr.opcode != expected as u32 {
            return Err(DecodeError::UnexpectedOpcode {
                found: hdr.opcode,
                expected,
            });
        }
        let packet_len = hdr.size_bytes as usize;
        if packet_len < fixed_size {
            return Err(DecodeError::BadSizeBytes {
                found: hdr.size_bytes,
            });
        }
        if buf.len() < packet_len {
            return Err(DecodeError::BufferTooSmall);
        }
        Ok(Self {
            buf: &buf[..packet_len],
            offset: CmdHdr::SIZE_BYTES,
        })
    }

    fn u32(&mut self) -> u32 {
        let v = read_u32_le(self.buf, self.offset);
        self.offset += 4;
        v
    }

    fn handle(&mut self) -> ResourceHandle {
        ResourceHandle(self.u32())
    }

    fn f32(&mut self) -> f32 {
        f32::from_bits(self.u32())
    }

    fn f64(&mut self) -> f64 {
        let v = read_u64_le(self.buf, self.offset);
        self.offset += 8;
        f64::from_bits(v)
    }

    /// Returns the `len` bytes following the fixed fields, if the packet holds them.
    fn trailing(&self, len: u32, element_size: u32) -> Result<&'a [u8], DecodeError> {
        if len % element_size != 0 {
            return Err(DecodeError::BadTrailingSize {
                found: len,
                element_size,
            });
        }
        let end = self
            .offset
            .checked_add(len as usize)
            .ok_or(DecodeError::CountOverflow)?;
        self.buf
            .get(self.offset..end)
            .ok_or(DecodeError::BufferTooSmall)
    }
}

/* --------------------------- Channel bookkeeping -------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VcmdCreateResource {
    pub handle: ResourceHandle,
    pub resource_type: ResourceType,
}

impl VcmdCreateResource {
    pub const SIZE_BYTES: usize = 16;

    pub fn encode_le(&self) -> Vec<u8> {
        PacketEncoder::new(CmdOpcode::CreateResource, Self::SIZE_BYTES)
            .handle(self.handle)
            .u32(self.resource_type as u32)
            .finish()
    }

    pub fn decode_le(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = PacketReader::new(buf, CmdOpcode::CreateResource, Self::SIZE_BYTES)?;
        let handle = r.handle();
        let raw_type = r.u32();
        let resource_type =
            ResourceType::from_u32(raw_type).ok_or(DecodeError::UnknownResourceType(raw_type))?;
        Ok(Self {
            handle,
            resource_type,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VcmdReleaseResource {
    pub handle: ResourceHandle,
    pub resource_type: ResourceType,
}

impl VcmdReleaseResource {
    pub const SIZE_BYTES: usize = 16;

    pub fn encode_le(&self) -> Vec<u8> {
        PacketEncoder::new(CmdOpcode::ReleaseResource, Self::SIZE_BYTES)
            .handle(self.handle)
            .u32(self.resource_type as u32)
            .finish()
    }

    pub fn decode_le(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = PacketReader::new(buf, CmdOpcode::ReleaseResource, Self::SIZE_BYTES)?;
        let handle = r.handle();
        let raw_type = r.u32();
        let resource_type =
            ResourceType::from_u32(raw_type).ok_or(DecodeError::UnknownResourceType(raw_type))?;
        Ok(Self {
            handle,
            resource_type,
        })
    }
}

/* ------------------------------- Transforms ------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VcmdTranslateTransformUpdate {
    pub handle: ResourceHandle,
    pub x: f64,
    pub y: f64,
    pub x_animations: ResourceHandle,
    pub y_animations: ResourceHandle,
}

impl VcmdTranslateTransformUpdate {
    pub const SIZE_BYTES: usize = 40;

    pub fn encode_le(&self) -> Vec<u8> {
        PacketEncoder::new(CmdOpcode::TranslateTransformUpdate, Self::SIZE_BYTES)
            .handle(self.handle)
            .u32(0)
            .f64(self.x)
            .f64(self.y)
            .handle(self.x_animations)
            .handle(self.y_animations)
            .finish()
    }

    pub fn decode_le(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = PacketReader::new(buf, CmdOpcode::TranslateTransformUpdate, Self::SIZE_BYTES)?;
        let handle = r.handle();
        let _reserved0 = r.u32();
        Ok(Self {
            handle,
            x: r.f64(),
            y: r.f64(),
            x_animations: r.handle(),
            y_animations: r.handle(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VcmdScaleTransformUpdate {
    pub handle: ResourceHandle,
    pub scale_x: f64,
    pub scale_y: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub scale_x_animations: ResourceHandle,
    pub scale_y_animations: ResourceHandle,
    pub center_x_animations: ResourceHandle,
    pub center_y_animations: ResourceHandle,
}

impl VcmdScaleTransformUpdate {
    pub const SIZE_BYTES: usize = 64;

    pub fn encode_le(&self) -> Vec<u8> {
        PacketEncoder::new(CmdOpcode::ScaleTransformUpdate, Self::SIZE_BYTES)
            .handle(self.handle)
            .u32(0)
            .f64(self.scale_x)
            .f64(self.scale_y)
            .f64(self.center_x)
            .f64(self.center_y)
            .handle(self.scale_x_animations)
            .handle(self.scale_y_animations)
            .handle(self.center_x_animations)
            .handle(self.center_y_animations)
            .finish()
    }

    pub fn decode_le(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = PacketReader::new(buf, CmdOpcode::ScaleTransformUpdate, Self::SIZE_BYTES)?;
        let handle = r.handle();
        let _reserved0 = r.u32();
        Ok(Self {
            handle,
            scale_x: r.f64(),
            scale_y: r.f64(),
            center_x: r.f64(),
            center_y: r.f64(),
            scale_x_animations: r.handle(),
            scale_y_animations: r.handle(),
            center_x_animations: r.handle(),
            center_y_animations: r.handle(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VcmdRotateTransformUpdate {
    pub handle: ResourceHandle,
    pub angle: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub angle_animations: ResourceHandle,
    pub center_x_animations: ResourceHandle,
    pub center_y_animations: ResourceHandle,
}

impl VcmdRotateTransformUpdate {
    pub const SIZE_BYTES: usize = 56;

    pub fn encode_le(&self) -> Vec<u8> {
        PacketEncoder::new(CmdOpcode::RotateTransformUpdate, Self::SIZE_BYTES)
            .handle(self.handle)
            .u32(0)
            .f64(self.angle)
            .f64(self.center_x)
            .f64(self.center_y)
            .handle(self.angle_animations)
            .handle(self.center_x_animations)
            .handle(self.center_y_animations)
            .u32(0)
            .finish()
    }

    pub fn decode_le(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = PacketReader::new(buf, CmdOpcode::RotateTransformUpdate, Self::SIZE_BYTES)?;
        let handle = r.handle();
        let _reserved0 = r.u32();
        Ok(Self {
            handle,
            angle: r.f64(),
            center_x: r.f64(),
            center_y: r.f64(),
            angle_animations: r.handle(),
            center_x_animations: r.handle(),
            center_y_animations: r.handle(),
        })
    }
}

/// Fixed part of `TRANSFORM_GROUP_UPDATE`; followed by `children_size_bytes` bytes of u32 handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VcmdTransformGroupUpdate {
    pub handle: ResourceHandle,
    pub children_size_bytes: u32,
}

impl VcmdTransformGroupUpdate {
    pub const SIZE_BYTES: usize = 16;
    pub const CHILD_SIZE_BYTES: usize = 4;

    pub fn encode_fixed_le(&self) -> Vec<u8> {
        // The header size is patched by the writer once the trailing length is known.
        PacketEncoder::new(CmdOpcode::TransformGroupUpdate, Self::SIZE_BYTES)
            .handle(self.handle)
            .u32(self.children_size_bytes)
            .finish()
    }

    pub fn decode_le(buf: &[u8]) -> Result<(Self, Vec<ResourceHandle>), DecodeError> {
        let mut r = PacketReader::new(buf, CmdOpcode::TransformGroupUpdate, Self::SIZE_BYTES)?;
        let handle = r.handle();
        let children_size_bytes = r.u32();
        let trailing = r.trailing(children_size_bytes, Self::CHILD_SIZE_BYTES as u32)?;
        let children = trailing
            .chunks_exact(Self::CHILD_SIZE_BYTES)
            .map(|chunk| ResourceHandle(read_u32_le(chunk, 0)))
            .collect();
        Ok((
            Self {
                handle,
                children_size_bytes,
            },
            children,
        ))
    }
}

/* --------------------------------- Brushes -------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VcmdSolidColorBrushUpdate {
    pub handle: ResourceHandle,
    pub opacity: f64,
    /// Straight (non-premultiplied) RGBA.
    pub color: [f32; 4],
    pub opacity_animations: ResourceHandle,
    pub color_animations: ResourceHandle,
    pub transform: ResourceHandle,
    pub relative_transform: ResourceHandle,
}

impl VcmdSolidColorBrushUpdate {
    pub const SIZE_BYTES: usize = 56;

    pub fn encode_le(&self) -> Vec<u8> {
        PacketEncoder::new(CmdOpcode::SolidColorBrushUpdate, Self::SIZE_BYTES)
            .handle(self.handle)
            .u32(0)
            .f64(self.opacity)
            .f32(self.color[0])
            .f32(self.color[1])
            .f32(self.color[2])
            .f32(self.color[3])
            .handle(self.opacity_animations)
            .handle(self.color_animations)
            .handle(self.transform)
            .handle(self.relative_transform)
            .finish()
    }

    pub fn decode_le(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = PacketReader::new(buf, CmdOpcode::SolidColorBrushUpdate, Self::SIZE_BYTES)?;
        let handle = r.handle();
        let _reserved0 = r.u32();
        Ok(Self {
            handle,
            opacity: r.f64(),
            color: [r.f32(), r.f32(), r.f32(), r.f32()],
            opacity_animations: r.handle(),
            color_animations: r.handle(),
            transform: r.handle(),
            relative_transform: r.handle(),
        })
    }
}

/// Fixed part of `DASH_STYLE_UPDATE`; followed by `dashes_size_bytes` bytes of f64 dashes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VcmdDashStyleUpdate {
    pub handle: ResourceHandle,
    pub offset_animations: ResourceHandle,
    pub offset: f64,
    pub dashes_size_bytes: u32,
}

impl VcmdDashStyleUpdate {
    pub const SIZE_BYTES: usize = 32;
    pub const DASH_SIZE_BYTES: usize = 8;

    pub fn encode_fixed_le(&self) -> Vec<u8> {
        PacketEncoder::new(CmdOpcode::DashStyleUpdate, Self::SIZE_BYTES)
            .handle(self.handle)
            .handle(self.offset_animations)
            .f64(self.offset)
            .u32(self.dashes_size_bytes)
            .u32(0)
            .finish()
    }

    pub fn decode_le(buf: &[u8]) -> Result<(Self, Vec<f64>), DecodeError> {
        let mut r = PacketReader::new(buf, CmdOpcode::DashStyleUpdate, Self::SIZE_BYTES)?;
        let handle = r.handle();
        let offset_animations = r.handle();
        let offset = r.f64();
        let dashes_size_bytes = r.u32();
        let _reserved0 = r.u32();
        let trailing = r.trailing(dashes_size_bytes, Self::DASH_SIZE_BYTES as u32)?;
        let dashes = trailing
            .chunks_exact(Self::DASH_SIZE_BYTES)
            .map(|chunk| f64::from_bits(read_u64_le(chunk, 0)))
            .collect();
        Ok((
            Self {
                handle,
                offset_animations,
                offset,
                dashes_size_bytes,
            },
            dashes,
        ))
    }
}

/* ------------------------------ Stream walking ---------------------------- */

#[derive(Clone, Copy, Debug)]
pub struct CmdPacket<'a> {
    pub hdr: CmdHdr,
    pub opcode: Option<CmdOpcode>,
    /// The whole packet, header included, so layout `decode_le` helpers apply directly.
    pub bytes: &'a [u8],
}

impl<'a> CmdPacket<'a> {
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[CmdHdr::SIZE_BYTES..]
    }
}

pub struct CmdStreamIter<'a> {
    header: CmdStreamHeader,
    buf: &'a [u8],
    offset: usize,
    end: usize,
    done: bool,
}

impl<'a> CmdStreamIter<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, DecodeError> {
        let header = decode_cmd_stream_header_le(buf)?;
        let end = header.size_bytes as usize;
        if buf.len() < end {
            return Err(DecodeError::BufferTooSmall);
        }

        Ok(Self {
            header,
            buf,
            offset: CmdStreamHeader::SIZE_BYTES,
            end,
            done: false,
        })
    }

    pub fn header(&self) -> &CmdStreamHeader {
        &self.header
    }
}

impl<'a> Iterator for CmdStreamIter<'a> {
    type Item = Result<CmdPacket<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.end {
            return None;
        }

        let hdr = match decode_cmd_hdr_le(&self.buf[self.offset..self.end]) {
            Ok(hdr) => hdr,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        let packet_end = match self.offset.checked_add(hdr.size_bytes as usize) {
            Some(end) => end,
            None => {
                self.done = true;
                return Some(Err(DecodeError::CountOverflow));
            }
        };
        if packet_end > self.end {
            self.done = true;
            return Some(Err(DecodeError::PacketOverrunsStream {
                offset: self.offset as u32,
                packet_size_bytes: hdr.size_bytes,
                stream_size_bytes: self.header.size_bytes,
            }));
        }

        let packet = CmdPacket {
            hdr,
            opcode: CmdOpcode::from_u32(hdr.opcode),
            bytes: &self.buf[self.offset..packet_end],
        };
        self.offset = packet_end;
        Some(Ok(packet))
    }
}

/// Decodes a whole batch into its packets, failing on the first malformed one.
pub fn decode_cmd_stream_le(buf: &[u8]) -> Result<(CmdStreamHeader, Vec<CmdPacket<'_>>), DecodeError> {
    let iter = CmdStreamIter::new(buf)?;
    let header = *iter.header();
    let packets = iter.collect::<Result<Vec<_>, _>>()?;
    Ok((header, packets))
}
