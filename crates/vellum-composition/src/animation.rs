use std::collections::HashMap;

use vellum_protocol::ResourceHandle;

use crate::channel::ChannelId;
use crate::property::Property;
use crate::resource::ResourceId;

/// Where the packer learns whether a property is currently animated on a channel.
///
/// A non-null handle names the remote animation resource that produces the live value; the
/// static value is then not sent.
pub trait AnimationSource: Send {
    fn animation_handle(
        &self,
        resource: ResourceId,
        property: Property,
        channel: ChannelId,
    ) -> ResourceHandle;
}

/// In-memory animation handle table fed by the animation subsystem.
#[derive(Debug, Default)]
pub struct AnimationTable {
    handles: HashMap<(ResourceId, Property, ChannelId), ResourceHandle>,
}

impl AnimationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or (with a null handle) clears the animation for one property on one channel.
    /// Returns the previous handle.
    pub fn set(
        &mut self,
        resource: ResourceId,
        property: Property,
        channel: ChannelId,
        handle: ResourceHandle,
    ) -> ResourceHandle {
        let key = (resource, property, channel);
        let previous = if handle.is_null() {
            self.handles.remove(&key)
        } else {
            self.handles.insert(key, handle)
        };
        previous.unwrap_or(ResourceHandle::NULL)
    }

    pub fn forget_channel(&mut self, channel: ChannelId) {
        self.handles.retain(|(_, _, ch), _| *ch != channel);
    }

    pub fn forget_resource(&mut self, resource: ResourceId) {
        self.handles.retain(|(id, _, _), _| *id != resource);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl AnimationSource for AnimationTable {
    fn animation_handle(
        &self,
        resource: ResourceId,
        property: Property,
        channel: ChannelId,
    ) -> ResourceHandle {
        self.handles
            .get(&(resource, property, channel))
            .copied()
            .unwrap_or(ResourceHandle::NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let mut table = AnimationTable::new();
        let res = ResourceId(1);
        let ch = ChannelId(1);
        assert_eq!(
            table.set(res, Property::X, ch, ResourceHandle(4)),
            ResourceHandle::NULL
        );
        assert_eq!(table.animation_handle(res, Property::X, ch), ResourceHandle(4));
        assert_eq!(table.animation_handle(res, Property::Y, ch), ResourceHandle::NULL);
        assert_eq!(
            table.set(res, Property::X, ch, ResourceHandle::NULL),
            ResourceHandle(4)
        );
        assert!(table.is_empty());
    }

    #[test]
    fn forget_channel_only_drops_that_channel() {
        let mut table = AnimationTable::new();
        let res = ResourceId(1);
        table.set(res, Property::X, ChannelId(1), ResourceHandle(4));
        table.set(res, Property::X, ChannelId(2), ResourceHandle(9));
        table.forget_channel(ChannelId(1));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.animation_handle(res, Property::X, ChannelId(2)),
            ResourceHandle(9)
        );
    }
}
