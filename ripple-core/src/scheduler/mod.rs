//! Update Scheduling
//!
//! Watchers re-run synchronously by default. Attaching an [`UpdateQueue`]
//! turns a watcher's `update()` into "enqueue me", and the queue runs each
//! pending watcher once per flush, in creation order.
//!
//! The queue has no timer of its own. Whoever owns it decides when state
//! has settled and calls [`UpdateQueue::flush`].

mod queue;

pub use queue::{Job, UpdateQueue};
