use parley_shared::constants::DEFAULT_CHANNEL_CAPACITY;

/// Configuration for the sync engines.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Capacity of the command and error side channels.
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
