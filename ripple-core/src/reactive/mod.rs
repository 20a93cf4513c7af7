//! Reactive Core
//!
//! This module implements dependency tracking: the [`Dep`] that stands for
//! one slot of observable state, the per-thread target stack that says which
//! computation is running, and the [`Watcher`] that ties the two together.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A Dep keeps the subscribers that read its slot during their last
//! evaluation. Reads call [`Dep::depend`], changing writes call
//! [`Dep::notify`].
//!
//! ## Watchers
//!
//! A Watcher runs a getter with itself as the active target. Every Dep the
//! getter reads is recorded, and Deps it no longer reads are dropped after
//! each pass, so notifications follow exactly what the last evaluation
//! looked at.
//!
//! ## Computed values
//!
//! A [`Computed`] is a lazy watcher with a cache. Notifications only mark it
//! dirty, and readers re-evaluate it on demand.
//!
//! # Implementation Notes
//!
//! Deps refer to watchers weakly and watchers hold their Deps strongly, so
//! the many-to-many graph has no ownership cycles. Locks are never held
//! while a getter, callback or subscriber runs, which keeps re-entrant
//! evaluation (a watcher created or notified inside another watcher's
//! getter) safe on a single thread.

mod computed;
mod context;
mod dep;
mod observed;
mod subscriber;
mod watcher;

pub use computed::Computed;
pub use context::{
    current_subscriber, current_target, depth, is_tracking, push_target, untracked, TargetGuard,
};
pub use dep::{Dep, DepId};
pub use observed::Observed;
pub use subscriber::{Subscriber, SubscriberId, Target};
pub use watcher::{Watcher, WatcherBuilder, WatcherKind};
