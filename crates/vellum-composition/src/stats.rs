use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of [`CompositionStats`], suitable for logging or forwarding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositionStatsSnapshot {
    pub resources_created: u64,
    pub resources_released: u64,
    pub update_commands: u64,
    pub bytes_marshalled: u64,
    pub sub_property_changes_skipped: u64,
}

/// Counters for the resource channel.
///
/// Updated under the composition lock but readable from any thread without it.
#[derive(Debug, Default)]
pub struct CompositionStats {
    resources_created: AtomicU64,
    resources_released: AtomicU64,
    update_commands: AtomicU64,
    bytes_marshalled: AtomicU64,
    sub_property_changes_skipped: AtomicU64,
}

impl CompositionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_resources_created(&self) {
        self.resources_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resources_released(&self) {
        self.resources_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update(&self, bytes: usize) {
        self.update_commands.fetch_add(1, Ordering::Relaxed);
        self.bytes_marshalled
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn inc_sub_property_changes_skipped(&self) {
        self.sub_property_changes_skipped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CompositionStatsSnapshot {
        CompositionStatsSnapshot {
            resources_created: self.resources_created.load(Ordering::Relaxed),
            resources_released: self.resources_released.load(Ordering::Relaxed),
            update_commands: self.update_commands.load(Ordering::Relaxed),
            bytes_marshalled: self.bytes_marshalled.load(Ordering::Relaxed),
            sub_property_changes_skipped: self
                .sub_property_changes_skipped
                .load(Ordering::Relaxed),
        }
    }
}
