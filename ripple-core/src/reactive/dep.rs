//! Dependency Implementation
//!
//! A [`Dep`] stands for one observable slot of state. It keeps the list of
//! subscribers that read the slot during their last evaluation, and it is the
//! only place the read side and the write side of the system meet:
//!
//! - on every read, the owning layer calls [`Dep::depend`], which hands the
//!   Dep to whichever [`Target`](super::Target) is active;
//! - on every changing write, it calls [`Dep::notify`], which calls
//!   [`Subscriber::update`] on everything in the list.
//!
//! # Ownership
//!
//! A Dep holds its subscribers weakly and a watcher holds its Deps strongly.
//! Neither side owns the other's lifetime, and no reference cycle forms
//! between them. A dropped watcher removes itself from its Deps on drop.
//!
//! # Duplicates
//!
//! [`Dep::add_sub`] appends without checking. Keeping each subscriber in the
//! list once is the watcher's job (see `Watcher::add_dep`).

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{error, trace};

use super::context;
use super::subscriber::{Subscriber, SubscriberId};

/// Unique identifier for a Dep.
///
/// Only used for membership bookkeeping inside watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    /// Generate a new unique dep ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SubscriberEntry {
    id: SubscriberId,
    lazy: bool,
    subscriber: Weak<dyn Subscriber>,
}

struct DepInner {
    id: DepId,
    subs: Mutex<Vec<SubscriberEntry>>,
}

/// An observable slot of state and the subscribers that currently read it.
///
/// Cloning a `Dep` creates a new handle to the same subscriber list.
#[derive(Clone)]
pub struct Dep {
    inner: Arc<DepInner>,
}

impl Dep {
    /// Create a new Dep with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DepInner {
                id: DepId::new(),
                subs: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get the Dep's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Append `subscriber` to the subscriber list.
    pub fn add_sub(&self, subscriber: &Arc<dyn Subscriber>) {
        let id = subscriber.id();
        trace!(dep = %self.id(), subscriber = %id, "subscribe");

        self.inner.subs.lock().push(SubscriberEntry {
            id,
            lazy: subscriber.is_lazy(),
            subscriber: Arc::downgrade(subscriber),
        });
    }

    /// Remove the first entry for `id`. Does nothing if there is none.
    pub fn remove_sub(&self, id: SubscriberId) {
        let mut subs = self.inner.subs.lock();
        if let Some(pos) = subs.iter().position(|entry| entry.id == id) {
            subs.remove(pos);
            trace!(dep = %self.id(), subscriber = %id, "unsubscribe");
        }
    }

    /// Register this Dep with the active target, if there is one.
    ///
    /// Must be called on every read of the state this Dep backs.
    pub fn depend(&self) {
        if let Some(target) = context::current_target() {
            target.add_dep(self);
        }
    }

    /// Call [`Subscriber::update`] on every current subscriber.
    ///
    /// The list is copied before the first call, so subscribers may add or
    /// remove themselves (or others) while being notified.
    ///
    /// Lazy subscribers (see [`Subscriber::is_lazy`]) are all updated first,
    /// then the eager ones. Each group is called in insertion order, so an
    /// eager subscriber that re-runs here never reads a computed value that
    /// has not been marked stale yet.
    ///
    /// # Panics
    ///
    /// A panicking subscriber does not stop the others from being notified.
    /// Once every subscriber in the copy has been called, the first panic is
    /// resumed.
    pub fn notify(&self) {
        let snapshot: SmallVec<[(bool, Weak<dyn Subscriber>); 8]> = self
            .inner
            .subs
            .lock()
            .iter()
            .map(|entry| (entry.lazy, entry.subscriber.clone()))
            .collect();

        trace!(dep = %self.id(), subscribers = snapshot.len(), "notify");

        let mut first_panic = None;
        for lazy_phase in [true, false] {
            for (lazy, subscriber) in &snapshot {
                if *lazy != lazy_phase {
                    continue;
                }
                let Some(subscriber) = subscriber.upgrade() else {
                    continue;
                };

                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| subscriber.update()))
                {
                    error!(
                        dep = %self.id(),
                        subscriber = %subscriber.id(),
                        panic = panic_message(payload.as_ref()),
                        "subscriber panicked during notify"
                    );
                    first_panic.get_or_insert(payload);
                }
            }
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    /// Get the number of subscriber entries.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.lock().len()
    }

    /// Get the subscriber IDs in notification order.
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.inner.subs.lock().iter().map(|entry| entry.id).collect()
    }

    /// Check whether `id` is in the subscriber list.
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.inner.subs.lock().iter().any(|entry| entry.id == id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Dep {}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
