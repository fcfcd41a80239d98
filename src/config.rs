/// Configuration for version maintenance and compaction picking.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Level 0 sublevel count threshold for compaction (default: 4)
    pub level0_compaction_threshold: usize,

    /// Byte threshold at which a flush splits its level 0 output; 0 disables
    /// splitting (default: 8MB)
    pub flush_split_bytes: u64,

    /// Maximum total bytes for level 1 (default: 64MB)
    pub base_level_bytes: u64,

    /// Size ratio between consecutive levels (default: 10)
    pub level_size_multiplier: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            level0_compaction_threshold: 4,
            flush_split_bytes: 8 * 1024 * 1024,    // 8MB
            base_level_bytes: 64 * 1024 * 1024,    // 64MB
            level_size_multiplier: 10,
        }
    }
}

impl CompactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level 0 compaction threshold
    pub fn level0_compaction_threshold(mut self, threshold: usize) -> Self {
        self.level0_compaction_threshold = threshold;
        self
    }

    /// Set the flush split byte threshold
    pub fn flush_split_bytes(mut self, bytes: u64) -> Self {
        self.flush_split_bytes = bytes;
        self
    }

    /// Set the maximum total bytes for level 1
    pub fn base_level_bytes(mut self, bytes: u64) -> Self {
        self.base_level_bytes = bytes;
        self
    }

    /// Set the size ratio between consecutive levels
    pub fn level_size_multiplier(mut self, multiplier: u64) -> Self {
        self.level_size_multiplier = multiplier;
        self
    }

    /// Maximum total bytes for the given level (level >= 1) before it scores
    /// for compaction.
    pub fn max_level_bytes(&self, level: usize) -> u64 {
        debug_assert!(level >= 1);
        let mut max = self.base_level_bytes;
        for _ in 1..level {
            max = max.saturating_mul(self.level_size_multiplier);
        }
        max
    }
}
