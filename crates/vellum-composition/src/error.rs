use thiserror::Error;

use crate::channel::ChannelId;

pub type Result<T> = std::result::Result<T, CompositionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("{0} is closed")]
    Closed(ChannelId),

    #[error("packet of {size} bytes exceeds the channel limit of {limit} bytes")]
    PacketTooLarge { size: usize, limit: usize },

    #[error("{0} has no free resource handles")]
    HandlesExhausted(ChannelId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("unknown {0}")]
    UnknownChannel(ChannelId),
}
