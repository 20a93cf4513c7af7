//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a [`Dep`] is read, the
//! active [`Target`] is registered as a dependent without the reading code
//! having to pass a watcher handle around.
//!
//! # Implementation
//!
//! Each thread owns one [`TargetStack`]: the active target plus the targets
//! it displaced. Entering an evaluation pushes, leaving it pops. Nested
//! evaluations (a computed value read while a render watcher runs, a child
//! watcher created inside a parent's getter) push and pop in strict LIFO
//! order on the native call stack.
//!
//! Pushing is only possible through [`push_target`], which returns a
//! [`TargetGuard`]. The pop happens when the guard is dropped, so it also
//! happens when the evaluation panics. A missed pop would attribute every
//! later read on this thread to the wrong watcher.
//!
//! [`Dep`]: super::Dep

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use smallvec::SmallVec;

use super::subscriber::{SubscriberId, Target};

thread_local! {
    static TARGET_STACK: RefCell<TargetStack> = RefCell::new(TargetStack::new());
}

/// The active target plus every target it displaced.
///
/// `None` entries are meaningful: pushing `None` suspends tracking, and the
/// entry it displaced comes back on the matching pop.
struct TargetStack {
    active: Option<Arc<dyn Target>>,
    saved: SmallVec<[Option<Arc<dyn Target>>; 8]>,
}

impl TargetStack {
    fn new() -> Self {
        Self {
            active: None,
            saved: SmallVec::new(),
        }
    }

    fn push(&mut self, target: Option<Arc<dyn Target>>) -> usize {
        let previous = std::mem::replace(&mut self.active, target);
        self.saved.push(previous);
        self.saved.len()
    }

    /// Restore the most recently displaced target and hand back the one that
    /// was active, so the caller can drop it outside the borrow.
    fn pop(&mut self) -> (usize, Option<Arc<dyn Target>>) {
        let depth = self.saved.len();
        let restored = self.saved.pop().flatten();
        let finished = std::mem::replace(&mut self.active, restored);
        (depth, finished)
    }
}

/// Guard that pops the target stack when dropped.
///
/// Guards must be dropped in the reverse order they were created. The guard
/// is tied to the thread that created it.
#[must_use = "dropping the guard immediately pops the target again"]
pub struct TargetGuard {
    depth: usize,
    subscriber_id: Option<SubscriberId>,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        let (depth, finished) = TARGET_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        debug_assert_eq!(
            depth, self.depth,
            "TargetGuard for {:?} dropped out of order",
            self.subscriber_id
        );

        drop(finished);
    }
}

/// Make `target` the active target until the returned guard is dropped.
///
/// Passing `None` suspends tracking: reads inside the scope register no
/// dependency on anything.
pub fn push_target(target: Option<Arc<dyn Target>>) -> TargetGuard {
    let subscriber_id = target.as_ref().map(|t| t.id());
    let depth = TARGET_STACK.with(|stack| stack.borrow_mut().push(target));

    TargetGuard {
        depth,
        subscriber_id,
        _not_send: PhantomData,
    }
}

/// Get the active target, if any.
pub fn current_target() -> Option<Arc<dyn Target>> {
    TARGET_STACK.with(|stack| stack.borrow().active.clone())
}

/// Get the ID of the active target, if any.
pub fn current_subscriber() -> Option<SubscriberId> {
    TARGET_STACK.with(|stack| stack.borrow().active.as_ref().map(|t| t.id()))
}

/// Check if reads are currently being attributed to a target.
pub fn is_tracking() -> bool {
    TARGET_STACK.with(|stack| stack.borrow().active.is_some())
}

/// Number of pushes that have not been popped yet on this thread.
pub fn depth() -> usize {
    TARGET_STACK.with(|stack| stack.borrow().saved.len())
}

/// Run `f` with tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = push_target(None);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Dep, Subscriber};

    struct Probe(SubscriberId);

    impl Subscriber for Probe {
        fn id(&self) -> SubscriberId {
            self.0
        }

        fn update(&self) {}
    }

    impl Target for Probe {
        fn add_dep(&self, _dep: &Dep) {}
    }

    fn probe() -> Arc<dyn Target> {
        Arc::new(Probe(SubscriberId::new()))
    }

    #[test]
    fn context_tracks_subscriber() {
        let target = probe();
        let id = target.id();

        assert!(!is_tracking());
        assert!(current_subscriber().is_none());

        {
            let _guard = push_target(Some(target));

            assert!(is_tracking());
            assert_eq!(current_subscriber(), Some(id));
            assert_eq!(depth(), 1);
        }

        // Context should be cleaned up after drop
        assert!(!is_tracking());
        assert!(current_subscriber().is_none());
        assert_eq!(depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let outer = probe();
        let inner = probe();
        let outer_id = outer.id();
        let inner_id = inner.id();

        {
            let _outer = push_target(Some(outer));
            assert_eq!(current_subscriber(), Some(outer_id));

            {
                let _inner = push_target(Some(inner));
                assert_eq!(current_subscriber(), Some(inner_id));
            }

            // After inner context drops, outer should be current
            assert_eq!(current_subscriber(), Some(outer_id));
        }

        assert!(current_subscriber().is_none());
    }

    #[test]
    fn untracked_scope_restores_outer_target() {
        let outer = probe();
        let outer_id = outer.id();

        let _outer = push_target(Some(outer));
        untracked(|| {
            assert!(!is_tracking());

            // A target pushed inside an untracked scope must not leak out.
            let _inner = push_target(Some(probe()));
            assert!(is_tracking());
        });

        assert_eq!(current_subscriber(), Some(outer_id));
    }

    #[test]
    fn guard_pops_during_unwind() {
        let target = probe();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = push_target(Some(target));
            panic!("getter failed");
        }));

        assert!(result.is_err());
        assert!(!is_tracking());
        assert_eq!(depth(), 0);
    }
}
