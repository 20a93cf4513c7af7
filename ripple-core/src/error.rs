//! Error types for the reactive core.
//!
//! Evaluation errors are not represented here: a getter that can fail
//! returns a `Result` as its value, and a getter that panics unwinds
//! straight through the watcher to whoever asked for the value. The
//! variants below cover the pieces of the core that can fail on their own.

use crate::reactive::SubscriberId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// A job kept re-queueing itself during a single flush.
    #[error("infinite update loop: subscriber {id} re-queued more than {limit} times in one flush")]
    InfiniteUpdateLoop { id: SubscriberId, limit: u32 },

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration document could not be parsed.
    #[error(transparent)]
    ConfigParse(#[from] serde_json::Error),
}
