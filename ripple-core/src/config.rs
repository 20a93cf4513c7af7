//! Runtime configuration.
//!
//! The tracking core itself has no tunables. The only knob lives on the
//! update queue: how many times one job may re-queue itself during a single
//! flush before the flush is aborted as a runaway loop.

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Default limit on self re-queues per flush.
pub const DEFAULT_MAX_UPDATE_COUNT: u32 = 100;

/// Configuration for an [`UpdateQueue`](crate::scheduler::UpdateQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of times a job may be re-queued while the queue is
    /// flushing before the flush fails with
    /// [`ReactiveError::InfiniteUpdateLoop`].
    pub max_update_count: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
        }
    }
}

impl QueueConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_update_count == 0 {
            return Err(ReactiveError::InvalidConfig(
                "max_update_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
