//! Source configuration

/// Configuration for a broadcast source
///
/// The buffer holds `block_size * block_count` bytes. A block is the unit of
/// producer/consumer granularity: the pull producer reads one block per
/// upstream read, readers receive at most one block per `read` call, and
/// retention only ever advances in whole blocks.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Minimum unit of producer writes and reader chunks, in bytes
    pub block_size: usize,

    /// Number of blocks retained in the buffer
    pub block_count: usize,

    /// Retain the entire stream instead of evicting
    ///
    /// The buffer grows by one block whenever it fills, retention never
    /// advances, and late attach always succeeds. Memory is unbounded;
    /// only use this for streams known to fit in memory.
    pub retain_all: bool,

    /// Fraction of capacity the slowest reader must pass before the first
    /// eviction happens
    ///
    /// Keeps the full history resident (so late joiners are still accepted)
    /// until the buffer is genuinely getting full.
    pub low_water: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            block_size: 64 * 1024,
            block_count: 256, // 16 MB retention window
            retain_all: false,
            low_water: 0.75,
        }
    }
}

impl SourceConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set the block count
    pub fn block_count(mut self, count: usize) -> Self {
        self.block_count = count;
        self
    }

    /// Retain the full stream instead of evicting old data
    pub fn retain_all(mut self, retain: bool) -> Self {
        self.retain_all = retain;
        self
    }

    /// Set the low-water fraction for the first eviction
    pub fn low_water(mut self, fraction: f64) -> Self {
        self.low_water = fraction;
        self
    }

    /// Total buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.block_size * self.block_count
    }

    /// Absolute offset the slowest reader must pass before the first eviction
    pub(crate) fn low_water_offset(&self) -> u64 {
        (self.capacity() as f64 * self.low_water) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity() {
        let config = SourceConfig::default();
        assert_eq!(config.capacity(), 16 * 1024 * 1024);
    }

    #[test]
    fn builder_chain() {
        let config = SourceConfig::new().block_size(4).block_count(2);
        assert_eq!(config.capacity(), 8);
        assert_eq!(config.low_water_offset(), 6);
    }
}
