//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive state.
//! This includes render watchers, computed values, and user watchers. A
//! [`Dep`] only ever sees the [`Subscriber`] capability, never a concrete
//! watcher type.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::dep::Dep;

/// Unique identifier for a subscriber.
///
/// IDs are handed out in creation order. An update queue relies on that
/// ordering to run a parent's watcher before the watchers of the children it
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something a [`Dep`] can notify.
pub trait Subscriber: Send + Sync {
    /// Stable identity, used to find this subscriber in a Dep's list.
    fn id(&self) -> SubscriberId;

    /// Called by [`Dep::notify`] when state this subscriber read has changed.
    fn update(&self);

    /// Whether `update` only marks this subscriber stale without running
    /// anything. [`Dep::notify`] updates lazy subscribers before eager ones.
    fn is_lazy(&self) -> bool {
        false
    }
}

/// A subscriber that can be the active entry of the dependency stack.
///
/// While a `Target` is active, every [`Dep::depend`] call is forwarded to
/// its [`add_dep`](Target::add_dep).
pub trait Target: Subscriber {
    /// Record that the running evaluation read `dep`.
    fn add_dep(&self, dep: &Dep);
}
