use std::fmt;

/// Marshalled properties across every resource kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    X,
    Y,
    ScaleX,
    ScaleY,
    CenterX,
    CenterY,
    Angle,
    Children,
    Opacity,
    Color,
    Transform,
    RelativeTransform,
    Offset,
    Dashes,
}

impl Property {
    pub const fn name(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::ScaleX => "ScaleX",
            Self::ScaleY => "ScaleY",
            Self::CenterX => "CenterX",
            Self::CenterY => "CenterY",
            Self::Angle => "Angle",
            Self::Children => "Children",
            Self::Opacity => "Opacity",
            Self::Color => "Color",
            Self::Transform => "Transform",
            Self::RelativeTransform => "RelativeTransform",
            Self::Offset => "Offset",
            Self::Dashes => "Dashes",
        }
    }

    /// Whether the remote side can drive this property from an animation resource.
    pub const fn is_animatable(self) -> bool {
        !matches!(
            self,
            Self::Children | Self::Transform | Self::RelativeTransform | Self::Dashes
        )
    }

    /// Whether the property holds a reference to another resource.
    pub const fn is_sub_resource(self) -> bool {
        matches!(
            self,
            Self::Children | Self::Transform | Self::RelativeTransform
        )
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
