//! Computed Values
//!
//! A [`Computed`] is a cached derived value backed by a lazy [`Watcher`].
//!
//! # How Computed Values Work
//!
//! 1. Nothing runs at creation. The first [`get`](Computed::get) evaluates
//!    the getter and caches the result.
//!
//! 2. When a source changes, the watcher is only marked dirty. No work is
//!    done until someone reads the value again.
//!
//! 3. When read inside another evaluation, the computed value forwards its
//!    own Deps to the reader. A render watcher that shows a computed value
//!    is therefore notified by the computed value's sources directly, and
//!    the computed value is re-evaluated on that render's next read.

use std::fmt;

use super::context;
use super::watcher::Watcher;

/// A lazily evaluated, cached value derived from reactive state.
///
/// Cloning a `Computed` creates a new handle to the same cache.
pub struct Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    watcher: Watcher<T>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a computed value. The getter runs on first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            watcher: Watcher::lazy(getter),
        }
    }

    /// Get the current value, re-evaluating first if a source changed.
    pub fn get(&self) -> T {
        let value = match self.watcher.value() {
            Some(value) if !self.watcher.is_dirty() => value,
            _ => self.watcher.evaluate(),
        };

        if context::is_tracking() {
            self.watcher.depend();
        }

        value
    }

    /// Get the cached value without evaluating or tracking.
    pub fn peek(&self) -> Option<T> {
        self.watcher.value()
    }

    /// Check if the next [`get`](Self::get) will re-evaluate.
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// Get the underlying watcher.
    pub fn watcher(&self) -> &Watcher<T> {
        &self.watcher
    }

    /// Stop tracking sources.
    ///
    /// Later reads return the cached value. If nothing was ever cached, they
    /// evaluate without subscribing to anything.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            watcher: self.watcher.clone(),
        }
    }
}

impl<T> fmt::Debug for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.watcher.id())
            .field("dirty", &self.is_dirty())
            .field("cached", &self.peek())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
