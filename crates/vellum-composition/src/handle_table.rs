//! Per-resource registration table: which channels a resource is on, the handle each channel
//! assigned, and how many references each registration holds.

use vellum_protocol::{ResourceHandle, ResourceType};

use crate::channel::{Channel, ChannelId};
use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    channel: ChannelId,
    handle: ResourceHandle,
    ref_count: u32,
}

/// Handle collection for one resource across every channel it is registered on.
///
/// A resource is usually on one or two channels, so registrations live in a small vector in
/// registration order; [`MultiChannelResource::channel_at`] enumerates them in that order.
#[derive(Debug, Clone, Default)]
pub struct MultiChannelResource {
    registrations: Vec<Registration>,
}

impl MultiChannelResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, channel: ChannelId) -> Option<usize> {
        self.registrations
            .iter()
            .position(|r| r.channel == channel)
    }

    /// Adds a reference on `channel`, creating the remote resource on the first one.
    ///
    /// Returns the handle and whether it was newly created. A new registration has no remote
    /// state yet; the caller must push the full state before anything else refers to it.
    pub fn create_or_add_ref(
        &mut self,
        channel: &mut dyn Channel,
        resource_type: ResourceType,
    ) -> Result<(ResourceHandle, bool), ChannelError> {
        if let Some(idx) = self.position(channel.id()) {
            let registration = &mut self.registrations[idx];
            registration.ref_count = registration
                .ref_count
                .checked_add(1)
                .unwrap_or_else(|| panic!("ref-count overflow on {}", registration.channel));
            return Ok((registration.handle, false));
        }

        let handle = channel.create_handle(resource_type)?;
        assert!(!handle.is_null(), "{} returned a null handle", channel.id());
        self.registrations.push(Registration {
            channel: channel.id(),
            handle,
            ref_count: 1,
        });
        Ok((handle, true))
    }

    /// Drops one reference on `channel`.
    ///
    /// Returns `true` when that was the last reference: the registration is gone, the remote
    /// resource has been released, and the caller must release whatever the resource itself
    /// referenced on this channel. Releasing a channel the resource is not on panics.
    pub fn release(&mut self, channel: &mut dyn Channel) -> Result<bool, ChannelError> {
        let Some(idx) = self.position(channel.id()) else {
            panic!("release on {} which holds no reference", channel.id());
        };

        let registration = self.registrations[idx];
        debug_assert!(registration.ref_count > 0);
        if registration.ref_count > 1 {
            self.registrations[idx].ref_count -= 1;
            return Ok(false);
        }

        channel.release_handle(registration.handle)?;
        self.registrations.remove(idx);
        Ok(true)
    }

    /// Handle on `channel`, or [`ResourceHandle::NULL`] when not registered. Never allocates.
    pub fn handle(&self, channel: ChannelId) -> ResourceHandle {
        self.position(channel)
            .map_or(ResourceHandle::NULL, |idx| self.registrations[idx].handle)
    }

    pub fn is_on_channel(&self, channel: ChannelId) -> bool {
        self.position(channel).is_some()
    }

    pub fn ref_count(&self, channel: ChannelId) -> u32 {
        self.position(channel)
            .map_or(0, |idx| self.registrations[idx].ref_count)
    }

    pub fn channel_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn channel_at(&self, index: usize) -> ChannelId {
        self.registrations[index].channel
    }

    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.registrations.iter().map(|r| r.channel)
    }

    pub fn is_registered(&self) -> bool {
        !self.registrations.is_empty()
    }

    /// Drops the registration on `channel` without talking to it. Only valid once the channel
    /// is closed and its remote state is gone.
    pub fn forget_channel(&mut self, channel: ChannelId) -> bool {
        match self.position(channel) {
            Some(idx) => {
                self.registrations.remove(idx);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::config::CompositionConfig;
    use vellum_protocol::command::{decode_cmd_stream_le, CmdOpcode};

    fn channel(id: u32) -> MemoryChannel {
        MemoryChannel::new(ChannelId(id), false, &CompositionConfig::default())
    }

    #[test]
    fn add_ref_then_release_leaves_resource_unregistered() {
        let mut ch = channel(1);
        let mut table = MultiChannelResource::new();

        let (handle, created) = table
            .create_or_add_ref(&mut ch, ResourceType::TranslateTransform)
            .unwrap();
        assert!(created);
        assert!(!handle.is_null());
        assert!(table.is_on_channel(ChannelId(1)));

        assert!(table.release(&mut ch).unwrap());
        assert!(!table.is_registered());
        assert_eq!(table.handle(ChannelId(1)), ResourceHandle::NULL);
        assert_eq!(ch.live_handles(), 0);
    }

    #[test]
    fn second_add_ref_reuses_handle() {
        let mut ch = channel(1);
        let mut table = MultiChannelResource::new();

        let (first, created) = table
            .create_or_add_ref(&mut ch, ResourceType::ScaleTransform)
            .unwrap();
        assert!(created);
        let (second, created) = table
            .create_or_add_ref(&mut ch, ResourceType::ScaleTransform)
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(table.ref_count(ChannelId(1)), 2);

        assert!(!table.release(&mut ch).unwrap());
        assert_eq!(table.ref_count(ChannelId(1)), 1);
        assert_eq!(table.handle(ChannelId(1)), first);
    }

    #[test]
    fn registrations_are_independent_per_channel() {
        let mut a = channel(1);
        let mut b = channel(2);
        let mut table = MultiChannelResource::new();

        table
            .create_or_add_ref(&mut a, ResourceType::DashStyle)
            .unwrap();
        table
            .create_or_add_ref(&mut b, ResourceType::DashStyle)
            .unwrap();
        assert_eq!(table.channel_count(), 2);
        assert_eq!(table.channel_at(0), ChannelId(1));
        assert_eq!(table.channel_at(1), ChannelId(2));

        assert!(table.release(&mut a).unwrap());
        assert_eq!(table.channels().collect::<Vec<_>>(), vec![ChannelId(2)]);
    }

    #[test]
    fn create_and_release_reach_the_channel() {
        let mut ch = channel(1);
        let queue = ch.batches();
        let mut table = MultiChannelResource::new();
        table
            .create_or_add_ref(&mut ch, ResourceType::TranslateTransform)
            .unwrap();
        table
            .create_or_add_ref(&mut ch, ResourceType::TranslateTransform)
            .unwrap();
        table.release(&mut ch).unwrap();
        table.release(&mut ch).unwrap();
        ch.commit().unwrap();

        let batch = queue.drain().pop().unwrap();
        let (_, packets) = decode_cmd_stream_le(&batch).unwrap();
        let opcodes: Vec<_> = packets.iter().map(|p| p.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                Some(CmdOpcode::CreateResource),
                Some(CmdOpcode::ReleaseResource)
            ]
        );
    }

    #[test]
    fn failed_create_leaves_table_untouched() {
        let mut ch = channel(1);
        ch.close();
        let mut table = MultiChannelResource::new();
        assert!(table
            .create_or_add_ref(&mut ch, ResourceType::TranslateTransform)
            .is_err());
        assert!(!table.is_registered());
    }

    #[test]
    fn forget_channel_drops_registration_silently() {
        let mut ch = channel(1);
        let mut table = MultiChannelResource::new();
        table
            .create_or_add_ref(&mut ch, ResourceType::TranslateTransform)
            .unwrap();
        assert!(table.forget_channel(ChannelId(1)));
        assert!(!table.forget_channel(ChannelId(1)));
        assert!(!table.is_registered());
    }

    #[test]
    #[should_panic(expected = "holds no reference")]
    fn double_release_panics() {
        let mut ch = channel(1);
        let mut table = MultiChannelResource::new();
        table
            .create_or_add_ref(&mut ch, ResourceType::TranslateTransform)
            .unwrap();
        table.release(&mut ch).unwrap();
        let _ = table.release(&mut ch);
    }
}
