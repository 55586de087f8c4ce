//! Merkle clock configuration.

/// Configuration for DAG walks driven by a clock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockConfig {
    /// Maximum number of nodes merged by a single sync walk.
    pub max_walk_nodes: usize,
    /// Re-check that every fetched node hashes to the CID it was requested
    /// under, even when the getter claims to verify.
    pub verify_blocks: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            max_walk_nodes: 100_000,
            verify_blocks: true,
        }
    }
}

/// Builder for clock configuration.
pub struct ClockConfigBuilder {
    config: ClockConfig,
}

impl ClockConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClockConfig::default(),
        }
    }

    pub fn max_walk_nodes(mut self, limit: usize) -> Self {
        self.config.max_walk_nodes = limit;
        self
    }

    pub fn verify_blocks(mut self, enabled: bool) -> Self {
        self.config.verify_blocks = enabled;
        self
    }

    pub fn build(self) -> ClockConfig {
        self.config
    }
}

impl Default for ClockConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
