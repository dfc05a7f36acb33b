//! Property change fan-out.
//!
//! Every setter mutates the local value and then re-marshals the owner to each channel it is
//! registered on. Sub-resource swaps and collection edits fix up the referenced resources'
//! registrations first so the remote side never sees a handle that is not live. An edit that
//! fails part way leaves the local value as it was.

use tracing::{debug, trace, warn};
use vellum_protocol::ResourceHandle;

use crate::channel::ChannelId;
use crate::composition::CompositionState;
use crate::error::{CompositionError, Result};
use crate::property::Property;
use crate::resource::{Color, DoubleCollection, Resource, ResourceId, TransformGroup};

/// Where a property's effective value comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueSource {
    /// The shared, immutable default.
    #[default]
    Default,
    /// A value set on (or promoted into) this resource.
    Local,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// The property now holds a different value.
    ValueReplaced,
    /// Something inside the current value changed (a collection element, a nested field).
    SubProperty,
}

/// Change notification as delivered by the property system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyChange {
    pub property: Property,
    pub kind: ChangeKind,
    pub old_source: ValueSource,
    pub new_source: ValueSource,
}

impl PropertyChange {
    pub fn replaced(property: Property) -> Self {
        Self {
            property,
            kind: ChangeKind::ValueReplaced,
            old_source: ValueSource::Local,
            new_source: ValueSource::Local,
        }
    }

    pub fn sub_property(property: Property, old_source: ValueSource, new_source: ValueSource) -> Self {
        Self {
            property,
            kind: ChangeKind::SubProperty,
            old_source,
            new_source,
        }
    }

    /// A sub-property change only needs marshalling when it also moved the value source
    /// (default promoted to local, or back).
    pub fn requires_marshal(&self) -> bool {
        match self.kind {
            ChangeKind::ValueReplaced => true,
            ChangeKind::SubProperty => self.old_source != self.new_source,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum EditStep {
    AddedRef(ResourceId, ChannelId),
    Released(ResourceId, ChannelId),
}

/// What a sub-resource or collection edit has done so far.
#[derive(Debug, Default)]
struct EditLog {
    steps: Vec<EditStep>,
    updated: Vec<ChannelId>,
}

impl EditLog {
    fn touched(&self, channel: ChannelId) -> bool {
        self.updated.contains(&channel)
            || self.steps.iter().any(|step| match *step {
                EditStep::AddedRef(_, c) | EditStep::Released(_, c) => c == channel,
            })
    }
}

impl CompositionState {
    /// Re-marshals `id` to every channel it is on in response to an external change
    /// notification. Returns the number of channels updated.
    pub fn property_changed(&mut self, id: ResourceId, change: PropertyChange) -> Result<usize> {
        assert!(
            self.resource(id).supports(change.property),
            "{id} has no {} property",
            change.property
        );
        if !change.requires_marshal() {
            self.stats.inc_sub_property_changes_skipped();
            trace!(resource = %id, property = %change.property, "sub-property change skipped");
            return Ok(0);
        }
        let channels = self.live_channels(id);
        self.update_channels(id, &channels)
    }

    /// Sets a scalar field. An unchanged value emits nothing.
    pub fn set_scalar(&mut self, id: ResourceId, property: Property, value: f64) -> Result<usize> {
        let Some(current) = self.resource(id).scalar(property) else {
            panic!("{id} has no scalar {property} property");
        };
        if current.to_bits() == value.to_bits() {
            return Ok(0);
        }
        if let Some(field) = self.slot_mut(id).resource.scalar_mut(property) {
            *field = value;
        }
        let channels = self.live_channels(id);
        self.update_channels(id, &channels)
    }

    pub fn set_color(&mut self, id: ResourceId, color: Color) -> Result<usize> {
        let Resource::SolidColorBrush(brush) = &mut self.slot_mut(id).resource else {
            panic!("{id} is not a solid color brush");
        };
        if brush.color == color {
            return Ok(0);
        }
        brush.color = color;
        let channels = self.live_channels(id);
        self.update_channels(id, &channels)
    }

    /// Replaces the dash array. A longer array that no longer fits one of the channels is
    /// rejected before anything changes.
    pub fn set_dashes(&mut self, id: ResourceId, dashes: impl Into<DoubleCollection>) -> Result<usize> {
        let dashes = dashes.into();
        let Resource::DashStyle(style) = &mut self.slot_mut(id).resource else {
            panic!("{id} is not a dash style");
        };
        if style.dashes.ptr_eq(&dashes) {
            return Ok(0);
        }
        let previous = std::mem::replace(&mut style.dashes, dashes);

        let channels = self.live_channels(id);
        if let Err(err) = self.check_fits_on(id, &channels) {
            if let Resource::DashStyle(style) = &mut self.slot_mut(id).resource {
                style.dashes = previous;
            }
            return Err(err);
        }
        self.update_channels(id, &channels)
    }

    /// Replaces a single-valued sub-resource reference.
    ///
    /// On every channel the owner is on, the old value is released and the new one add-ref'd
    /// before the owner's update goes out. If any step fails the local value is restored and
    /// the registrations are put back the way they were.
    pub fn set_sub_resource(
        &mut self,
        id: ResourceId,
        property: Property,
        value: Option<ResourceId>,
    ) -> Result<usize> {
        assert!(property.is_sub_resource(), "{property} does not reference a resource");
        let Some(old) = self.resource(id).sub_resource(property) else {
            panic!("{id} has no sub-resource {property} property");
        };
        if old == value {
            return Ok(0);
        }
        if let Some(new) = value {
            self.assert_transform(new);
            assert!(!self.reaches(new, id), "{new} would reference {id} cyclically");
        }

        self.write_sub_resource(id, property, value);
        let channels = self.live_channels(id);
        if let Err(err) = self.check_fits_on(id, &channels) {
            self.write_sub_resource(id, property, old);
            return Err(err);
        }

        let mut log = EditLog::default();
        if let Err(err) = self.fan_out_edit(id, &channels, old, value, &mut log) {
            self.write_sub_resource(id, property, old);
            self.unwind_edit(id, &channels, log);
            return Err(err);
        }
        Ok(channels.len())
    }

    fn write_sub_resource(&mut self, id: ResourceId, property: Property, value: Option<ResourceId>) {
        if let Some(slot) = self.slot_mut(id).resource.sub_resource_mut(property) {
            *slot = value;
        }
    }

    /// Inserts `child` into a transform group at `index`, add-refs it wherever the group is and
    /// re-marshals the group. On failure the group is left as it was.
    pub fn insert_child(&mut self, group: ResourceId, index: usize, child: ResourceId) -> Result<usize> {
        self.assert_transform(child);
        assert!(!self.reaches(child, group), "{child} would contain {group} cyclically");
        let g = self.group_mut(group);
        assert!(
            index <= g.children().len(),
            "insert index {index} out of range for {} children",
            g.children().len()
        );
        let previous = g.clone();
        g.insert_child(index, child);

        let channels = self.live_channels(group);
        if let Err(err) = self.check_fits_on(group, &channels) {
            *self.group_mut(group) = previous;
            return Err(err);
        }

        let mut log = EditLog::default();
        if let Err(err) = self.fan_out_edit(group, &channels, None, Some(child), &mut log) {
            *self.group_mut(group) = previous;
            self.unwind_edit(group, &channels, log);
            return Err(err);
        }
        Ok(channels.len())
    }

    pub fn push_child(&mut self, group: ResourceId, child: ResourceId) -> Result<usize> {
        let len = match self.resource(group) {
            Resource::TransformGroup(g) => g.children().len(),
            _ => panic!("{group} is not a transform group"),
        };
        self.insert_child(group, len, child)
    }

    /// Removes the child at `index`, releasing it wherever the group is. On failure the group
    /// is left as it was.
    pub fn remove_child(&mut self, group: ResourceId, index: usize) -> Result<ResourceId> {
        let g = self.group_mut(group);
        assert!(
            index < g.children().len(),
            "remove index {index} out of range for {} children",
            g.children().len()
        );
        let previous = g.clone();
        let child = g.remove_child(index);

        let channels = self.live_channels(group);
        let mut log = EditLog::default();
        if let Err(err) = self.fan_out_edit(group, &channels, Some(child), None, &mut log) {
            *self.group_mut(group) = previous;
            self.unwind_edit(group, &channels, log);
            return Err(err);
        }
        Ok(child)
    }

    fn group_mut(&mut self, id: ResourceId) -> &mut TransformGroup {
        match &mut self.slot_mut(id).resource {
            Resource::TransformGroup(g) => g,
            _ => panic!("{id} is not a transform group"),
        }
    }

    /// Moves one reference of `owner` from `release` to `add_ref` on each channel, then pushes
    /// the owner's new state. Every step that completes is recorded in `log`.
    fn fan_out_edit(
        &mut self,
        owner: ResourceId,
        channels: &[ChannelId],
        release: Option<ResourceId>,
        add_ref: Option<ResourceId>,
        log: &mut EditLog,
    ) -> Result<()> {
        for &channel in channels {
            if let Some(old) = release {
                self.release_on_channel(old, channel)?;
                log.steps.push(EditStep::Released(old, channel));
            }
            if let Some(new) = add_ref {
                self.add_ref_on_channel(new, channel)?;
                log.steps.push(EditStep::AddedRef(new, channel));
            }
        }
        for &channel in channels {
            self.update_on_channel(owner, channel)?;
            log.updated.push(channel);
        }
        Ok(())
    }

    /// Reverts the steps in `log`, newest first, and re-sends the owner's restored state to
    /// every channel the edit touched. Failures are logged; the caller reports the error that
    /// started the unwind.
    fn unwind_edit(&mut self, owner: ResourceId, channels: &[ChannelId], log: EditLog) {
        for step in log.steps.iter().rev() {
            let undone = match *step {
                EditStep::AddedRef(id, channel) => self.release_on_channel(id, channel).map(drop),
                EditStep::Released(id, channel) => self.add_ref_on_channel(id, channel).map(drop),
            };
            if let Err(err) = undone {
                warn!(resource = %owner, ?step, %err, "could not undo edit step");
            }
        }
        for &channel in channels.iter().filter(|&&c| log.touched(c)) {
            let complete = self
                .resource(owner)
                .sub_resources()
                .into_iter()
                .all(|child| self.slot(child).registrations.is_on_channel(channel));
            if !complete {
                warn!(
                    resource = %owner,
                    channel = %channel,
                    "references missing, state not restored"
                );
                continue;
            }
            if let Err(err) = self.update_on_channel(owner, channel) {
                warn!(resource = %owner, channel = %channel, %err, "could not restore state");
            }
        }
        debug!(resource = %owner, steps = log.steps.len(), "edit unwound");
    }

    /// Attaches (or, with a null handle, detaches) the animation driving `property` on one
    /// channel. Returns whether an update was emitted.
    pub fn set_animation(
        &mut self,
        id: ResourceId,
        property: Property,
        channel: ChannelId,
        handle: ResourceHandle,
    ) -> Result<bool> {
        assert!(property.is_animatable(), "{property} cannot be animated");
        assert!(
            self.resource(id).supports(property),
            "{id} has no {property} property"
        );
        if !self.channels.contains_key(&channel) {
            return Err(CompositionError::UnknownChannel(channel));
        }
        let previous = self.animations.set(id, property, channel, handle);
        if previous == handle || !self.slot(id).registrations.is_on_channel(channel) {
            return Ok(false);
        }
        self.update_on_channel(id, channel)?;
        Ok(true)
    }

    pub fn clear_animation(&mut self, id: ResourceId, property: Property, channel: ChannelId) -> Result<bool> {
        self.set_animation(id, property, channel, ResourceHandle::NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_property_change_marshals_only_on_source_change() {
        let same = PropertyChange::sub_property(Property::Children, ValueSource::Local, ValueSource::Local);
        assert!(!same.requires_marshal());
        let promoted =
            PropertyChange::sub_property(Property::Children, ValueSource::Default, ValueSource::Local);
        assert!(promoted.requires_marshal());
        assert!(PropertyChange::replaced(Property::X).requires_marshal());
    }
}
