//! Command packing: one update command per resource kind.
//!
//! Fixed-size kinds are built as a whole packet and sent in one call. Kinds with a
//! variable-length tail (transform group children, dash arrays) declare the tail length up
//! front, append one element at a time and close the command; the channel treats that sequence
//! as a single unit.

use vellum_protocol::command::{
    VcmdDashStyleUpdate, VcmdRotateTransformUpdate, VcmdScaleTransformUpdate,
    VcmdSolidColorBrushUpdate, VcmdTransformGroupUpdate, VcmdTranslateTransformUpdate,
};
use vellum_protocol::ResourceHandle;

use crate::animation::AnimationSource;
use crate::channel::{Channel, ChannelId};
use crate::error::ChannelError;
use crate::property::Property;
use crate::resource::{Resource, ResourceId};

/// Everything the packer needs besides the resource value itself.
pub struct PackContext<'a> {
    pub resource: ResourceId,
    /// Handle of `resource` on `channel`; must not be null.
    pub handle: ResourceHandle,
    pub channel: ChannelId,
    pub animations: &'a dyn AnimationSource,
    /// Resolves a referenced resource to its handle on `channel`.
    pub sub_resource_handle: &'a dyn Fn(ResourceId) -> ResourceHandle,
}

impl PackContext<'_> {
    /// Static value and animation handle for one field. An animated field sends a zero value.
    fn animated(&self, property: Property, value: f64) -> (f64, ResourceHandle) {
        let animation = self
            .animations
            .animation_handle(self.resource, property, self.channel);
        if animation.is_null() {
            (value, ResourceHandle::NULL)
        } else {
            (0.0, animation)
        }
    }

    fn animation(&self, property: Property) -> ResourceHandle {
        self.animations
            .animation_handle(self.resource, property, self.channel)
    }

    fn sub_handle(&self, child: ResourceId) -> ResourceHandle {
        let handle = (self.sub_resource_handle)(child);
        assert!(
            !handle.is_null(),
            "{} references {child} which is not on {}",
            self.resource,
            self.channel
        );
        handle
    }

    fn optional_sub_handle(&self, child: Option<ResourceId>) -> ResourceHandle {
        child.map_or(ResourceHandle::NULL, |child| self.sub_handle(child))
    }
}

/// Writes the full-state update command for `resource` to `channel` and returns the packet size.
///
/// Packing for a resource that has no handle on the channel is a caller bug and panics.
pub fn pack_update(
    resource: &Resource,
    ctx: &PackContext<'_>,
    channel: &mut dyn Channel,
) -> Result<usize, ChannelError> {
    assert!(
        !ctx.handle.is_null(),
        "update for {} which has no handle on {}",
        ctx.resource,
        ctx.channel
    );
    assert_eq!(channel.id(), ctx.channel, "packing against the wrong channel");

    match resource {
        Resource::TranslateTransform(t) => {
            let (x, x_animations) = ctx.animated(Property::X, t.x);
            let (y, y_animations) = ctx.animated(Property::Y, t.y);
            send_fixed(
                channel,
                &VcmdTranslateTransformUpdate {
                    handle: ctx.handle,
                    x,
                    y,
                    x_animations,
                    y_animations,
                }
                .encode_le(),
            )
        }
        Resource::ScaleTransform(t) => {
            let (scale_x, scale_x_animations) = ctx.animated(Property::ScaleX, t.scale_x);
            let (scale_y, scale_y_animations) = ctx.animated(Property::ScaleY, t.scale_y);
            let (center_x, center_x_animations) = ctx.animated(Property::CenterX, t.center_x);
            let (center_y, center_y_animations) = ctx.animated(Property::CenterY, t.center_y);
            send_fixed(
                channel,
                &VcmdScaleTransformUpdate {
                    handle: ctx.handle,
                    scale_x,
                    scale_y,
                    center_x,
                    center_y,
                    scale_x_animations,
                    scale_y_animations,
                    center_x_animations,
                    center_y_animations,
                }
                .encode_le(),
            )
        }
        Resource::RotateTransform(t) => {
            let (angle, angle_animations) = ctx.animated(Property::Angle, t.angle);
            let (center_x, center_x_animations) = ctx.animated(Property::CenterX, t.center_x);
            let (center_y, center_y_animations) = ctx.animated(Property::CenterY, t.center_y);
            send_fixed(
                channel,
                &VcmdRotateTransformUpdate {
                    handle: ctx.handle,
                    angle,
                    center_x,
                    center_y,
                    angle_animations,
                    center_x_animations,
                    center_y_animations,
                }
                .encode_le(),
            )
        }
        Resource::SolidColorBrush(b) => {
            let (opacity, opacity_animations) = ctx.animated(Property::Opacity, b.opacity);
            let color_animations = ctx.animation(Property::Color);
            let color = if color_animations.is_null() {
                b.color.to_array()
            } else {
                [0.0; 4]
            };
            send_fixed(
                channel,
                &VcmdSolidColorBrushUpdate {
                    handle: ctx.handle,
                    opacity,
                    color,
                    opacity_animations,
                    color_animations,
                    transform: ctx.optional_sub_handle(b.transform),
                    relative_transform: ctx.optional_sub_handle(b.relative_transform),
                }
                .encode_le(),
            )
        }
        Resource::TransformGroup(group) => {
            let children: Vec<ResourceHandle> = group
                .children()
                .iter()
                .map(|&child| ctx.sub_handle(child))
                .collect();
            let trailing = children.len() * VcmdTransformGroupUpdate::CHILD_SIZE_BYTES;
            let fixed = VcmdTransformGroupUpdate {
                handle: ctx.handle,
                children_size_bytes: trailing_len_u32(trailing)?,
            }
            .encode_fixed_le();

            channel.begin_command(&fixed, trailing)?;
            for child in children {
                channel.append_command_data(&child.raw().to_le_bytes())?;
            }
            channel.end_command()?;
            Ok(padded(fixed.len() + trailing))
        }
        Resource::DashStyle(style) => {
            let (offset, offset_animations) = ctx.animated(Property::Offset, style.offset);
            let trailing = style.dashes.len() * VcmdDashStyleUpdate::DASH_SIZE_BYTES;
            let fixed = VcmdDashStyleUpdate {
                handle: ctx.handle,
                offset_animations,
                offset,
                dashes_size_bytes: trailing_len_u32(trailing)?,
            }
            .encode_fixed_le();

            channel.begin_command(&fixed, trailing)?;
            for dash in style.dashes.iter() {
                channel.append_command_data(&dash.to_le_bytes())?;
            }
            channel.end_command()?;
            Ok(padded(fixed.len() + trailing))
        }
    }
}

/// Size of the packet [`pack_update`] writes for `resource`, without writing it.
pub fn update_size(resource: &Resource) -> usize {
    match resource {
        Resource::TranslateTransform(_) => VcmdTranslateTransformUpdate::SIZE_BYTES,
        Resource::ScaleTransform(_) => VcmdScaleTransformUpdate::SIZE_BYTES,
        Resource::RotateTransform(_) => VcmdRotateTransformUpdate::SIZE_BYTES,
        Resource::SolidColorBrush(_) => VcmdSolidColorBrushUpdate::SIZE_BYTES,
        Resource::TransformGroup(group) => padded(
            VcmdTransformGroupUpdate::SIZE_BYTES
                + group.children().len() * VcmdTransformGroupUpdate::CHILD_SIZE_BYTES,
        ),
        Resource::DashStyle(style) => padded(
            VcmdDashStyleUpdate::SIZE_BYTES
                + style.dashes.len() * VcmdDashStyleUpdate::DASH_SIZE_BYTES,
        ),
    }
}

fn send_fixed(channel: &mut dyn Channel, packet: &[u8]) -> Result<usize, ChannelError> {
    channel.send_command(packet)?;
    Ok(packet.len())
}

fn trailing_len_u32(len: usize) -> Result<u32, ChannelError> {
    u32::try_from(len).map_err(|_| ChannelError::PacketTooLarge {
        size: len,
        limit: u32::MAX as usize,
    })
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}
