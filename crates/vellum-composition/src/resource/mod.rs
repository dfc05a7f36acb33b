//! Local resource kinds with remote-side state.
//!
//! [`Resource`] is a tagged variant over the concrete kinds; the kind tag selects the wire
//! command in [`crate::packer`].

mod brush;
mod dash_style;
mod transform;

use std::fmt;

use vellum_protocol::ResourceType;

use crate::property::Property;

pub use brush::{Color, SolidColorBrush};
pub use dash_style::{DashStyle, DoubleCollection};
pub use transform::{RotateTransform, ScaleTransform, TransformGroup, TranslateTransform};

/// Identity of a resource inside one [`crate::Composition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl ResourceId {
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource {}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    TranslateTransform(TranslateTransform),
    ScaleTransform(ScaleTransform),
    RotateTransform(RotateTransform),
    TransformGroup(TransformGroup),
    SolidColorBrush(SolidColorBrush),
    DashStyle(DashStyle),
}

impl Resource {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::TranslateTransform(_) => ResourceType::TranslateTransform,
            Self::ScaleTransform(_) => ResourceType::ScaleTransform,
            Self::RotateTransform(_) => ResourceType::RotateTransform,
            Self::TransformGroup(_) => ResourceType::TransformGroup,
            Self::SolidColorBrush(_) => ResourceType::SolidColorBrush,
            Self::DashStyle(_) => ResourceType::DashStyle,
        }
    }

    pub fn is_transform(&self) -> bool {
        matches!(
            self,
            Self::TranslateTransform(_)
                | Self::ScaleTransform(_)
                | Self::RotateTransform(_)
                | Self::TransformGroup(_)
        )
    }

    /// Properties this kind marshals.
    pub fn properties(&self) -> &'static [Property] {
        match self {
            Self::TranslateTransform(_) => &[Property::X, Property::Y],
            Self::ScaleTransform(_) => &[
                Property::ScaleX,
                Property::ScaleY,
                Property::CenterX,
                Property::CenterY,
            ],
            Self::RotateTransform(_) => &[Property::Angle, Property::CenterX, Property::CenterY],
            Self::TransformGroup(_) => &[Property::Children],
            Self::SolidColorBrush(_) => &[
                Property::Opacity,
                Property::Color,
                Property::Transform,
                Property::RelativeTransform,
            ],
            Self::DashStyle(_) => &[Property::Offset, Property::Dashes],
        }
    }

    pub fn supports(&self, property: Property) -> bool {
        self.properties().contains(&property)
    }

    /// Resources this one references, in the order they are add-ref'd on a channel. A resource
    /// listed twice holds two references.
    pub fn sub_resources(&self) -> Vec<ResourceId> {
        match self {
            Self::TransformGroup(group) => group.children().to_vec(),
            Self::SolidColorBrush(brush) => brush
                .transform
                .into_iter()
                .chain(brush.relative_transform)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn scalar(&self, property: Property) -> Option<f64> {
        match (self, property) {
            (Self::TranslateTransform(t), Property::X) => Some(t.x),
            (Self::TranslateTransform(t), Property::Y) => Some(t.y),
            (Self::ScaleTransform(t), Property::ScaleX) => Some(t.scale_x),
            (Self::ScaleTransform(t), Property::ScaleY) => Some(t.scale_y),
            (Self::ScaleTransform(t), Property::CenterX) => Some(t.center_x),
            (Self::ScaleTransform(t), Property::CenterY) => Some(t.center_y),
            (Self::RotateTransform(t), Property::Angle) => Some(t.angle),
            (Self::RotateTransform(t), Property::CenterX) => Some(t.center_x),
            (Self::RotateTransform(t), Property::CenterY) => Some(t.center_y),
            (Self::SolidColorBrush(b), Property::Opacity) => Some(b.opacity),
            (Self::DashStyle(d), Property::Offset) => Some(d.offset),
            _ => None,
        }
    }

    pub(crate) fn scalar_mut(&mut self, property: Property) -> Option<&mut f64> {
        match (self, property) {
            (Self::TranslateTransform(t), Property::X) => Some(&mut t.x),
            (Self::TranslateTransform(t), Property::Y) => Some(&mut t.y),
            (Self::ScaleTransform(t), Property::ScaleX) => Some(&mut t.scale_x),
            (Self::ScaleTransform(t), Property::ScaleY) => Some(&mut t.scale_y),
            (Self::ScaleTransform(t), Property::CenterX) => Some(&mut t.center_x),
            (Self::ScaleTransform(t), Property::CenterY) => Some(&mut t.center_y),
            (Self::RotateTransform(t), Property::Angle) => Some(&mut t.angle),
            (Self::RotateTransform(t), Property::CenterX) => Some(&mut t.center_x),
            (Self::RotateTransform(t), Property::CenterY) => Some(&mut t.center_y),
            (Self::SolidColorBrush(b), Property::Opacity) => Some(&mut b.opacity),
            (Self::DashStyle(d), Property::Offset) => Some(&mut d.offset),
            _ => None,
        }
    }

    /// Single-valued resource reference held in `property`, if the kind has such a slot.
    pub fn sub_resource(&self, property: Property) -> Option<Option<ResourceId>> {
        match (self, property) {
            (Self::SolidColorBrush(b), Property::Transform) => Some(b.transform),
            (Self::SolidColorBrush(b), Property::RelativeTransform) => Some(b.relative_transform),
            _ => None,
        }
    }

    pub(crate) fn sub_resource_mut(&mut self, property: Property) -> Option<&mut Option<ResourceId>> {
        match (self, property) {
            (Self::SolidColorBrush(b), Property::Transform) => Some(&mut b.transform),
            (Self::SolidColorBrush(b), Property::RelativeTransform) => {
                Some(&mut b.relative_transform)
            }
            _ => None,
        }
    }
}

impl From<TranslateTransform> for Resource {
    fn from(v: TranslateTransform) -> Self {
        Self::TranslateTransform(v)
    }
}

impl From<ScaleTransform> for Resource {
    fn from(v: ScaleTransform) -> Self {
        Self::ScaleTransform(v)
    }
}

impl From<RotateTransform> for Resource {
    fn from(v: RotateTransform) -> Self {
        Self::RotateTransform(v)
    }
}

impl From<TransformGroup> for Resource {
    fn from(v: TransformGroup) -> Self {
        Self::TransformGroup(v)
    }
}

impl From<SolidColorBrush> for Resource {
    fn from(v: SolidColorBrush) -> Self {
        Self::SolidColorBrush(v)
    }
}

impl From<DashStyle> for Resource {
    fn from(v: DashStyle) -> Self {
        Self::DashStyle(v)
    }
}
