//! Client side of the composition resource channel.
//!
//! Local resources (transforms, brushes, dash styles) are registered on one or more
//! [`Channel`]s. Each registration is reference counted in the resource's
//! [`MultiChannelResource`]; the first reference creates the remote resource and pushes its full
//! state, the last release tears it down. Local mutations are re-marshalled to every channel the
//! resource is currently on.
//!
//! All of this runs under the single composition lock owned by [`Composition`].

#![forbid(unsafe_code)]

mod animation;
mod channel;
mod composition;
mod config;
mod error;
mod handle_table;
mod notify;
mod packer;
mod property;
mod resource;
mod stats;

pub use animation::{AnimationSource, AnimationTable};
pub use channel::{BatchQueue, Channel, ChannelId, MemoryChannel};
pub use composition::{Composition, CompositionGuard, CompositionState};
pub use config::{CompositionConfig, ConfigError, MIN_PACKET_BYTES};
pub use error::{ChannelError, CompositionError, Result};
pub use handle_table::MultiChannelResource;
pub use notify::{ChangeKind, PropertyChange, ValueSource};
pub use packer::{pack_update, update_size, PackContext};
pub use property::Property;
pub use resource::{
    Color, DashStyle, DoubleCollection, Resource, ResourceId, RotateTransform, ScaleTransform,
    SolidColorBrush, TransformGroup, TranslateTransform,
};
pub use stats::{CompositionStats, CompositionStatsSnapshot};

pub use vellum_protocol::{ResourceHandle, ResourceType};
