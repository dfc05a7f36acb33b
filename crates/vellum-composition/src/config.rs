use thiserror::Error;
use vellum_protocol::command::VcmdScaleTransformUpdate;

/// Smallest accepted `max_packet_bytes`.
pub const MIN_PACKET_BYTES: usize = VcmdScaleTransformUpdate::SIZE_BYTES;

/// Limits applied to every channel opened by a [`crate::Composition`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositionConfig {
    /// Largest single packet (header included) a channel accepts.
    pub max_packet_bytes: usize,
    /// Initial reservation for each batch buffer.
    pub batch_capacity: usize,
    /// Number of live handles a channel may hand out.
    pub max_handles: u32,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            max_packet_bytes: 1 << 20,
            batch_capacity: 4096,
            max_handles: u32::MAX - 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),
}

impl CompositionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_packet_bytes = parse_var(&lookup, "VELLUM_MAX_PACKET_BYTES")?
            .unwrap_or(defaults.max_packet_bytes);
        let batch_capacity =
            parse_var(&lookup, "VELLUM_BATCH_CAPACITY")?.unwrap_or(defaults.batch_capacity);
        let max_handles =
            parse_var(&lookup, "VELLUM_MAX_HANDLES")?.unwrap_or(defaults.max_handles);

        // Every fixed-size update must fit; the scale transform update is the largest.
        if max_packet_bytes < MIN_PACKET_BYTES {
            return Err(ConfigError::InvalidEnv("VELLUM_MAX_PACKET_BYTES"));
        }
        if max_handles == 0 || max_handles == u32::MAX {
            return Err(ConfigError::InvalidEnv("VELLUM_MAX_HANDLES"));
        }

        Ok(Self {
            max_packet_bytes,
            batch_capacity,
            max_handles,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_vars_keep_defaults() {
        let config = CompositionConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, CompositionConfig::default());
    }

    #[test]
    fn parses_overrides() {
        let config = CompositionConfig::from_lookup(|name| match name {
            "VELLUM_MAX_PACKET_BYTES" => Some("256".into()),
            "VELLUM_MAX_HANDLES" => Some(" 8 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.max_packet_bytes, 256);
        assert_eq!(config.max_handles, 8);
        assert_eq!(config.batch_capacity, 4096);
    }

    #[test]
    fn rejects_garbage_and_out_of_range_values() {
        let err = CompositionConfig::from_lookup(|name| {
            (name == "VELLUM_BATCH_CAPACITY").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidEnv("VELLUM_BATCH_CAPACITY"));

        let err = CompositionConfig::from_lookup(|name| {
            (name == "VELLUM_MAX_HANDLES").then(|| "0".to_string())
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidEnv("VELLUM_MAX_HANDLES"));
    }

    #[test]
    fn packet_limit_must_fit_every_fixed_update() {
        let with_limit = |limit: usize| {
            CompositionConfig::from_lookup(move |name| {
                (name == "VELLUM_MAX_PACKET_BYTES").then(|| limit.to_string())
            })
        };
        assert_eq!(
            with_limit(MIN_PACKET_BYTES - 1),
            Err(ConfigError::InvalidEnv("VELLUM_MAX_PACKET_BYTES"))
        );
        assert_eq!(
            with_limit(MIN_PACKET_BYTES).map(|c| c.max_packet_bytes),
            Ok(64)
        );
    }
}
