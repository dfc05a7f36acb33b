//! Channels: destinations for marshalled resource commands.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use vellum_protocol::command::{VcmdCreateResource, VcmdReleaseResource};
use vellum_protocol::{CommandWriter, ResourceHandle, ResourceType};

use crate::config::CompositionConfig;
use crate::error::ChannelError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.0)
    }
}

/// One remote composition target.
///
/// Handles are allocated by the channel: [`Channel::create_handle`] emits the remote create
/// command and [`Channel::release_handle`] the matching release. Commands are either sent whole
/// ([`Channel::send_command`]) or framed with begin/append/end; a framed command is a single unit
/// from the remote side's point of view.
pub trait Channel: Send {
    fn id(&self) -> ChannelId;

    fn is_open(&self) -> bool;

    /// Out-of-band channels deliver every command as its own batch instead of waiting for
    /// [`Channel::commit`].
    fn is_out_of_band(&self) -> bool;

    /// Largest single packet, header included, the channel accepts.
    fn max_packet_bytes(&self) -> usize;

    fn create_handle(&mut self, resource_type: ResourceType) -> Result<ResourceHandle, ChannelError>;

    /// Releases a handle returned by [`Channel::create_handle`]. Releasing a handle that is not
    /// live on this channel is a caller bug and panics.
    fn release_handle(&mut self, handle: ResourceHandle) -> Result<(), ChannelError>;

    fn send_command(&mut self, packet: &[u8]) -> Result<(), ChannelError>;

    fn begin_command(&mut self, fixed: &[u8], trailing_size: usize) -> Result<(), ChannelError>;

    fn append_command_data(&mut self, data: &[u8]) -> Result<(), ChannelError>;

    fn end_command(&mut self) -> Result<(), ChannelError>;

    /// Hands the commands written so far to the remote side.
    fn commit(&mut self) -> Result<(), ChannelError>;

    fn close(&mut self);
}

/// Committed batches of a [`MemoryChannel`], shared with whoever drains them.
#[derive(Debug, Clone, Default)]
pub struct BatchQueue {
    inner: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, batch: Vec<u8>) {
        self.lock().push(batch);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn drain(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.lock())
    }
}

/// Hands out handles with reuse; 0 is never allocated.
#[derive(Debug)]
struct HandleAllocator {
    live: HashMap<u32, ResourceType>,
    free: Vec<u32>,
    next: u32,
    max_handles: u32,
}

impl HandleAllocator {
    fn new(max_handles: u32) -> Self {
        Self {
            live: HashMap::new(),
            free: Vec::new(),
            next: 1,
            max_handles,
        }
    }

    fn allocate(&mut self, resource_type: ResourceType) -> Option<ResourceHandle> {
        if self.live.len() >= self.max_handles as usize {
            return None;
        }
        let raw = match self.free.pop() {
            Some(raw) => raw,
            None => {
                let raw = self.next;
                self.next = self.next.checked_add(1)?;
                raw
            }
        };
        self.live.insert(raw, resource_type);
        Some(ResourceHandle(raw))
    }

    fn free(&mut self, handle: ResourceHandle) -> Option<ResourceType> {
        let resource_type = self.live.remove(&handle.raw())?;
        self.free.push(handle.raw());
        Some(resource_type)
    }
}

/// In-process channel that records committed batches into a [`BatchQueue`].
#[derive(Debug)]
pub struct MemoryChannel {
    id: ChannelId,
    out_of_band: bool,
    open: bool,
    max_packet_bytes: usize,
    writer: CommandWriter,
    handles: HandleAllocator,
    batches: BatchQueue,
}

impl MemoryChannel {
    pub fn new(id: ChannelId, out_of_band: bool, config: &CompositionConfig) -> Self {
        Self {
            id,
            out_of_band,
            open: true,
            max_packet_bytes: config.max_packet_bytes,
            writer: CommandWriter::with_capacity(config.batch_capacity),
            handles: HandleAllocator::new(config.max_handles),
            batches: BatchQueue::new(),
        }
    }

    /// Queue the committed batches land in.
    pub fn batches(&self) -> BatchQueue {
        self.batches.clone()
    }

    pub fn live_handles(&self) -> usize {
        self.handles.live.len()
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.open {
            Ok(())
        } else {
            Err(ChannelError::Closed(self.id))
        }
    }

    fn ensure_fits(&self, size: usize) -> Result<(), ChannelError> {
        if size > self.max_packet_bytes {
            return Err(ChannelError::PacketTooLarge {
                size,
                limit: self.max_packet_bytes,
            });
        }
        Ok(())
    }

    fn command_done(&mut self) {
        if self.out_of_band {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if !self.writer.is_empty() {
            self.batches.push(self.writer.take_batch());
        }
    }
}

impl Channel for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_out_of_band(&self) -> bool {
        self.out_of_band
    }

    fn max_packet_bytes(&self) -> usize {
        self.max_packet_bytes
    }

    fn create_handle(&mut self, resource_type: ResourceType) -> Result<ResourceHandle, ChannelError> {
        self.ensure_open()?;
        let handle = self
            .handles
            .allocate(resource_type)
            .ok_or(ChannelError::HandlesExhausted(self.id))?;
        self.writer.send_command(
            &VcmdCreateResource {
                handle,
                resource_type,
            }
            .encode_le(),
        );
        self.command_done();
        Ok(handle)
    }

    fn release_handle(&mut self, handle: ResourceHandle) -> Result<(), ChannelError> {
        self.ensure_open()?;
        let Some(resource_type) = self.handles.free(handle) else {
            panic!("release of handle {handle} which is not live on {}", self.id);
        };
        self.writer.send_command(
            &VcmdReleaseResource {
                handle,
                resource_type,
            }
            .encode_le(),
        );
        self.command_done();
        Ok(())
    }

    fn send_command(&mut self, packet: &[u8]) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.ensure_fits(packet.len())?;
        self.writer.send_command(packet);
        self.command_done();
        Ok(())
    }

    fn begin_command(&mut self, fixed: &[u8], trailing_size: usize) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.ensure_fits(fixed.len().saturating_add(trailing_size))?;
        self.writer.begin_command(fixed, trailing_size);
        Ok(())
    }

    fn append_command_data(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.writer.append_command_data(data);
        Ok(())
    }

    fn end_command(&mut self) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.writer.end_command();
        self.command_done();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.flush();
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        debug!(
            channel = %self.id,
            live_handles = self.handles.live.len(),
            "closing memory channel"
        );
        // Pending commands are dropped with the channel; the remote side is gone.
        self.open = false;
        self.handles = HandleAllocator::new(self.handles.max_handles);
        if !self.writer.is_command_open() {
            self.writer.reset();
        }
    }
}
