//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Limits and diagnostics for a [`Scheduler`](crate::scheduler::Scheduler).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use trellis_core::Config;
///
/// let config = Config::from_json(r#"{ "max_rerenders": 50 }"#).unwrap();
/// assert_eq!(config.max_rerenders, 50);
/// assert_eq!(config.max_dirty_passes, 25);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Consecutive re-renders of one node within a single evaluation before
    /// the pass fails with [`Error::TooManyRerenders`].
    pub max_rerenders: usize,

    /// Consecutive passes that dirty the tree again (through effects) before
    /// the flush fails with [`Error::UpdateLoop`].
    pub max_dirty_passes: usize,

    /// Emit key diagnostics while reconciling lists.
    pub dev_checks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_rerenders: 25,
            max_dirty_passes: 25,
            dev_checks: cfg!(debug_assertions),
        }
    }
}

impl Config {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_rerenders(mut self, limit: usize) -> Self {
        self.max_rerenders = limit;
        self
    }

    pub fn with_max_dirty_passes(mut self, limit: usize) -> Self {
        self.max_dirty_passes = limit;
        self
    }

    pub fn with_dev_checks(mut self, enabled: bool) -> Self {
        self.dev_checks = enabled;
        self
    }

    /// Reject limits that would make every render fail.
    pub fn validate(&self) -> Result<()> {
        if self.max_rerenders == 0 {
            return Err(Error::Config("max_rerenders must be at least 1".into()));
        }
        if self.max_dirty_passes == 0 {
            return Err(Error::Config("max_dirty_passes must be at least 1".into()));
        }
        Ok(())
    }
}
