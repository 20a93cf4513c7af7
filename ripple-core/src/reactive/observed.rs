//! Observed Values
//!
//! [`Observed`] is the smallest possible property layer: one value backed by
//! one [`Dep`]. It shows the contract any property-interception layer must
//! keep with the core:
//!
//! 1. every read calls [`Dep::depend`];
//! 2. every write that changes the value calls [`Dep::notify`];
//! 3. a write that leaves the value unchanged notifies nobody.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::dep::Dep;

/// A reactive slot holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = Observed::new(0);
///
/// // Read the value (tracked if a watcher is evaluating)
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Observed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    dep: Dep,
    value: Arc<RwLock<T>>,
}

impl<T> Observed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new slot with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            dep: Dep::new(),
            value: Arc::new(RwLock::new(value)),
        }
    }

    /// Get the Dep backing this slot.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// Get the current value, registering a dependency on it.
    pub fn get(&self) -> T {
        self.dep.depend();
        self.value.read().clone()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value, registering a dependency on it.
    ///
    /// The slot is read-locked while `f` runs, so `f` must not write to it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.dep.depend();
        f(&self.value.read())
    }

    /// Set a new value and notify subscribers if it differs from the old one.
    ///
    /// Returns `true` if the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }

        self.dep.notify();
        true
    }

    /// Update the value using a function.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.value.read());
        self.set(new_value)
    }
}

impl<T> Clone for Observed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            dep: self.dep.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Debug for Observed<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observed")
            .field("dep", &self.dep.id())
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.dep.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
