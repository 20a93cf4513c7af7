//! Ripple Core
//!
//! This crate provides the dependency tracking core of the Ripple reactive
//! UI framework. It implements:
//!
//! - Deps: one per observable slot of state, each holding its subscribers
//! - The target stack: which computation is evaluating right now
//! - Watchers: render, computed, and user computations that re-discover
//!   their dependencies on every evaluation
//! - An optional update queue that batches re-evaluations
//!
//! Property interception, rendering, and templating live above this crate
//! and talk to it through [`Dep::depend`](reactive::Dep::depend) and
//! [`Dep::notify`](reactive::Dep::notify).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Deps, the target stack, watchers, computed values
//! - `scheduler`: the update queue watchers can defer to
//! - `config`: queue configuration
//! - `error`: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::reactive::{Computed, Observed, Watcher};
//!
//! let count = Observed::new(1);
//!
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! let render = Watcher::new({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("count: {}, doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Prints: "count: 5, doubled: 10"
//! count.set(5);
//!
//! render.teardown();
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::QueueConfig;
pub use error::{ReactiveError, Result};
