//! The composition lock and the resource lifecycle it guards.

use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace, warn};
use vellum_protocol::ResourceHandle;

use crate::animation::AnimationTable;
use crate::channel::{BatchQueue, Channel, ChannelId, MemoryChannel};
use crate::config::{CompositionConfig, ConfigError};
use crate::error::{ChannelError, CompositionError, Result};
use crate::handle_table::MultiChannelResource;
use crate::packer::{pack_update, update_size, PackContext};
use crate::resource::{Resource, ResourceId};
use crate::stats::{CompositionStats, CompositionStatsSnapshot};

pub(crate) struct ResourceSlot {
    pub(crate) resource: Resource,
    pub(crate) registrations: MultiChannelResource,
}

/// Owner of the composition lock.
///
/// Every handle-table mutation and every command emission happens through the
/// [`CompositionGuard`] returned by [`Composition::lock`], which serializes add-ref, update and
/// release for each resource/channel pair in program order.
pub struct Composition {
    state: Mutex<CompositionState>,
    stats: Arc<CompositionStats>,
}

impl Default for Composition {
    fn default() -> Self {
        Self::new(CompositionConfig::default())
    }
}

impl Composition {
    pub fn new(config: CompositionConfig) -> Self {
        let stats = Arc::new(CompositionStats::new());
        Self {
            state: Mutex::new(CompositionState {
                config,
                stats: Arc::clone(&stats),
                resources: HashMap::new(),
                next_resource_id: 1,
                channels: BTreeMap::new(),
                next_channel_id: 1,
                animations: AnimationTable::new(),
            }),
            stats,
        }
    }

    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(CompositionConfig::from_env()?))
    }

    /// Counters can be read without taking the lock.
    pub fn stats(&self) -> CompositionStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn lock(&self) -> CompositionGuard<'_> {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        CompositionGuard { state }
    }
}

/// Exclusive access to the composition state for the lifetime of the guard.
pub struct CompositionGuard<'a> {
    state: MutexGuard<'a, CompositionState>,
}

impl Deref for CompositionGuard<'_> {
    type Target = CompositionState;

    fn deref(&self) -> &CompositionState {
        &self.state
    }
}

impl DerefMut for CompositionGuard<'_> {
    fn deref_mut(&mut self) -> &mut CompositionState {
        &mut self.state
    }
}

/// Resources, channels and animation handles. Only reachable through a [`CompositionGuard`].
pub struct CompositionState {
    config: CompositionConfig,
    pub(crate) stats: Arc<CompositionStats>,
    pub(crate) resources: HashMap<ResourceId, ResourceSlot>,
    next_resource_id: u64,
    pub(crate) channels: BTreeMap<ChannelId, Box<dyn Channel>>,
    next_channel_id: u32,
    pub(crate) animations: AnimationTable,
}

impl CompositionState {
    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /* ------------------------------- Resources ------------------------------- */

    pub fn create_resource(&mut self, resource: impl Into<Resource>) -> ResourceId {
        let resource = resource.into();
        for child in resource.sub_resources() {
            self.assert_transform(child);
        }
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        self.resources.insert(
            id,
            ResourceSlot {
                resource,
                registrations: MultiChannelResource::new(),
            },
        );
        id
    }

    /// Removes a resource that is on no channel and referenced by no other resource.
    pub fn destroy_resource(&mut self, id: ResourceId) -> Resource {
        assert!(
            !self.slot(id).registrations.is_registered(),
            "destroying {id} while it is still on a channel"
        );
        assert!(
            !self
                .resources
                .values()
                .any(|slot| slot.resource.sub_resources().contains(&id)),
            "destroying {id} while another resource references it"
        );
        self.animations.forget_resource(id);
        match self.resources.remove(&id) {
            Some(slot) => slot.resource,
            None => unreachable!(),
        }
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.slot(id).resource
    }

    pub(crate) fn slot(&self, id: ResourceId) -> &ResourceSlot {
        match self.resources.get(&id) {
            Some(slot) => slot,
            None => panic!("unknown {id}"),
        }
    }

    pub(crate) fn slot_mut(&mut self, id: ResourceId) -> &mut ResourceSlot {
        match self.resources.get_mut(&id) {
            Some(slot) => slot,
            None => panic!("unknown {id}"),
        }
    }

    pub(crate) fn assert_transform(&self, id: ResourceId) {
        assert!(
            self.slot(id).resource.is_transform(),
            "{id} is not a transform"
        );
    }

    /// Whether `from` reaches `target` through sub-resource references (or is `target`).
    pub(crate) fn reaches(&self, from: ResourceId, target: ResourceId) -> bool {
        if from == target {
            return true;
        }
        self.slot(from)
            .resource
            .sub_resources()
            .into_iter()
            .any(|child| self.reaches(child, target))
    }

    /* ------------------------------- Channels -------------------------------- */

    /// Registers a channel built by `make` for a freshly allocated id.
    pub fn add_channel(&mut self, make: impl FnOnce(ChannelId) -> Box<dyn Channel>) -> ChannelId {
        let id = ChannelId(self.next_channel_id);
        self.next_channel_id += 1;
        let channel = make(id);
        assert_eq!(channel.id(), id, "channel built with the wrong id");
        debug!(
            channel = %id,
            out_of_band = channel.is_out_of_band(),
            "channel added"
        );
        self.channels.insert(id, channel);
        id
    }

    pub fn open_memory_channel(&mut self, out_of_band: bool) -> (ChannelId, BatchQueue) {
        let config = self.config.clone();
        let mut queue = None;
        let id = self.add_channel(|id| {
            let channel = MemoryChannel::new(id, out_of_band, &config);
            queue = Some(channel.batches());
            Box::new(channel)
        });
        (id, queue.unwrap_or_default())
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().collect()
    }

    /// Closes and removes a channel. Every registration on it is forgotten without emitting
    /// releases; returns how many resources were on it.
    pub fn close_channel(&mut self, channel_id: ChannelId) -> Result<usize> {
        let mut channel = self
            .channels
            .remove(&channel_id)
            .ok_or(CompositionError::UnknownChannel(channel_id))?;

        let forgotten = self
            .resources
            .values_mut()
            .map(|slot| slot.registrations.forget_channel(channel_id))
            .filter(|&forgot| forgot)
            .count();
        self.animations.forget_channel(channel_id);
        channel.close();
        debug!(channel = %channel_id, forgotten, "channel closed");
        Ok(forgotten)
    }

    pub fn commit_channel(&mut self, channel_id: ChannelId) -> Result<()> {
        self.channel_mut(channel_id)?.commit()?;
        Ok(())
    }

    pub fn commit_all(&mut self) -> Result<()> {
        for channel in self.channels.values_mut() {
            if channel.is_open() {
                channel.commit()?;
            }
        }
        Ok(())
    }

    fn channel_mut(&mut self, channel_id: ChannelId) -> Result<&mut Box<dyn Channel>> {
        self.channels
            .get_mut(&channel_id)
            .ok_or(CompositionError::UnknownChannel(channel_id))
    }

    /// Channels `id` is registered on that can still take commands, in registration order.
    pub(crate) fn live_channels(&self, id: ResourceId) -> Vec<ChannelId> {
        self.slot(id)
            .registrations
            .channels()
            .filter(|channel_id| match self.channels.get(channel_id) {
                Some(channel) if channel.is_open() => true,
                _ => {
                    warn!(resource = %id, channel = %channel_id, "skipping closed channel");
                    false
                }
            })
            .collect()
    }

    /* --------------------------- Handle table access ------------------------- */

    pub fn handle_on_channel(&self, id: ResourceId, channel_id: ChannelId) -> ResourceHandle {
        self.slot(id).registrations.handle(channel_id)
    }

    pub fn ref_count(&self, id: ResourceId, channel_id: ChannelId) -> u32 {
        self.slot(id).registrations.ref_count(channel_id)
    }

    pub fn channel_count(&self, id: ResourceId) -> usize {
        self.slot(id).registrations.channel_count()
    }

    pub fn channel_at(&self, id: ResourceId, index: usize) -> ChannelId {
        self.slot(id).registrations.channel_at(index)
    }

    /* ------------------------------- Lifecycle ------------------------------- */

    /// Adds a reference to `id` on `channel_id`.
    ///
    /// On the first reference the remote resource is created, everything it references is
    /// add-ref'd on the same channel, and its full state is pushed once. A first add-ref either
    /// completes or leaves neither local registrations nor live remote handles behind.
    pub fn add_ref_on_channel(
        &mut self,
        id: ResourceId,
        channel_id: ChannelId,
    ) -> Result<(ResourceHandle, bool)> {
        if !self.slot(id).registrations.is_on_channel(channel_id) {
            self.check_fits_on(id, &[channel_id])?;
        }
        self.add_ref_unchecked(id, channel_id)
    }

    fn add_ref_unchecked(
        &mut self,
        id: ResourceId,
        channel_id: ChannelId,
    ) -> Result<(ResourceHandle, bool)> {
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(CompositionError::UnknownChannel(channel_id))?;
        let slot = match self.resources.get_mut(&id) {
            Some(slot) => slot,
            None => panic!("unknown {id}"),
        };
        let resource_type = slot.resource.resource_type();
        let (handle, created) = slot
            .registrations
            .create_or_add_ref(&mut **channel, resource_type)?;
        if !created {
            trace!(resource = %id, channel = %channel_id, %handle, "add-ref");
            return Ok((handle, false));
        }

        self.stats.inc_resources_created();
        debug!(
            resource = %id,
            channel = %channel_id,
            %handle,
            ?resource_type,
            "resource created on channel"
        );

        let children = slot.resource.sub_resources();
        for (done, &child) in children.iter().enumerate() {
            if let Err(err) = self.add_ref_unchecked(child, channel_id) {
                self.abandon_creation(id, &children[..done], channel_id);
                return Err(err);
            }
        }
        if let Err(err) = self.update_on_channel(id, channel_id) {
            self.abandon_creation(id, &children, channel_id);
            return Err(err);
        }
        Ok((handle, true))
    }

    /// Backs out a first add-ref that failed part way: the fresh registration of `id` is
    /// released, then the `children` that were already add-ref'd for it.
    fn abandon_creation(&mut self, id: ResourceId, children: &[ResourceId], channel_id: ChannelId) {
        let Self {
            resources,
            channels,
            stats,
            ..
        } = self;
        let slot = match resources.get_mut(&id) {
            Some(slot) => slot,
            None => panic!("unknown {id}"),
        };
        let released = match channels.get_mut(&channel_id) {
            Some(channel) => slot.registrations.release(&mut **channel),
            None => Err(ChannelError::Closed(channel_id)),
        };
        match released {
            Ok(_) => {
                stats.inc_resources_released();
                debug!(resource = %id, channel = %channel_id, "abandoned creation on channel");
            }
            Err(err) => {
                // The channel is gone; so is the remote handle.
                warn!(
                    resource = %id,
                    channel = %channel_id,
                    %err,
                    "could not release abandoned resource"
                );
                slot.registrations.forget_channel(channel_id);
            }
        }

        for &child in children {
            if let Err(err) = self.release_on_channel(child, channel_id) {
                warn!(
                    resource = %child,
                    channel = %channel_id,
                    %err,
                    "could not release child of abandoned resource"
                );
            }
        }
    }

    /// Drops a reference to `id` on `channel_id`; on the last one the remote resource is
    /// released and everything it references is released on the same channel.
    ///
    /// Releasing a resource that holds no reference on the channel panics.
    pub fn release_on_channel(&mut self, id: ResourceId, channel_id: ChannelId) -> Result<bool> {
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(CompositionError::UnknownChannel(channel_id))?;
        let slot = match self.resources.get_mut(&id) {
            Some(slot) => slot,
            None => panic!("unknown {id}"),
        };
        if !slot.registrations.release(&mut **channel)? {
            trace!(resource = %id, channel = %channel_id, "release");
            return Ok(false);
        }

        self.stats.inc_resources_released();
        debug!(resource = %id, channel = %channel_id, "resource released on channel");

        let children = slot.resource.sub_resources();
        for child in children {
            self.release_on_channel(child, channel_id)?;
        }
        Ok(true)
    }

    /// Pushes the full state of `id` to `channel_id`. The resource must be on the channel.
    pub fn update_on_channel(&mut self, id: ResourceId, channel_id: ChannelId) -> Result<()> {
        let Self {
            resources,
            channels,
            animations,
            stats,
            ..
        } = self;
        let channel = channels
            .get_mut(&channel_id)
            .ok_or(CompositionError::UnknownChannel(channel_id))?;
        let slot = match resources.get(&id) {
            Some(slot) => slot,
            None => panic!("unknown {id}"),
        };

        let resolve = |child: ResourceId| {
            resources
                .get(&child)
                .map_or(ResourceHandle::NULL, |s| s.registrations.handle(channel_id))
        };
        let ctx = PackContext {
            resource: id,
            handle: slot.registrations.handle(channel_id),
            channel: channel_id,
            animations: &*animations,
            sub_resource_handle: &resolve,
        };
        let bytes = pack_update(&slot.resource, &ctx, &mut **channel)?;
        stats.record_update(bytes);
        trace!(resource = %id, channel = %channel_id, bytes, "update");
        Ok(())
    }

    /// Pushes the full state of `id` to each of `channels`; returns how many were updated.
    pub(crate) fn update_channels(&mut self, id: ResourceId, channels: &[ChannelId]) -> Result<usize> {
        for &channel_id in channels {
            self.update_on_channel(id, channel_id)?;
        }
        Ok(channels.len())
    }

    /// Fails with [`ChannelError::PacketTooLarge`] when marshalling `id` to any of `channels`,
    /// together with whatever it references that is not on that channel yet, would need a
    /// packet the channel does not accept. Emits nothing.
    pub(crate) fn check_fits_on(&self, id: ResourceId, channels: &[ChannelId]) -> Result<()> {
        for &channel_id in channels {
            let channel = self
                .channels
                .get(&channel_id)
                .ok_or(CompositionError::UnknownChannel(channel_id))?;
            self.check_fits(id, channel_id, channel.max_packet_bytes())?;
        }
        Ok(())
    }

    fn check_fits(
        &self,
        id: ResourceId,
        channel_id: ChannelId,
        limit: usize,
    ) -> std::result::Result<(), ChannelError> {
        let resource = &self.slot(id).resource;
        let size = update_size(resource);
        if size > limit {
            return Err(ChannelError::PacketTooLarge { size, limit });
        }
        for child in resource.sub_resources() {
            if !self.slot(child).registrations.is_on_channel(channel_id) {
                self.check_fits(child, channel_id, limit)?;
            }
        }
        Ok(())
    }
}
