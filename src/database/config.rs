//! # Engine Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | nested_scope_size | 1 KiB | Bytes carved from the caller arena for each DML sub-statement |
//! | sort_budget | none | Cap on bytes a single Sort may buffer; none means "what the arena has" |
//!
//! ```ignore
//! let config = EngineConfig::builder()
//!     .nested_scope_size(2048)
//!     .sort_budget(4096)
//!     .build();
//! let engine = Engine::with_config(storage, config);
//! ```

use crate::config::DEFAULT_NESTED_SCOPE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub nested_scope_size: usize,
    pub sort_budget: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nested_scope_size: DEFAULT_NESTED_SCOPE_SIZE,
            sort_budget: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn nested_scope_size(mut self, bytes: usize) -> Self {
        self.config.nested_scope_size = bytes;
        self
    }

    pub fn sort_budget(mut self, bytes: usize) -> Self {
        self.config.sort_budget = Some(bytes);
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
