//! Integration Tests for the Reactive Core
//!
//! These tests verify that Deps, watchers, computed values and the update
//! queue work together correctly.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ripple_core::reactive::{
    is_tracking, push_target, Computed, Dep, Observed, Subscriber, SubscriberId, Watcher,
};
use ripple_core::scheduler::UpdateQueue;

/// Reading the same slot many times in one pass subscribes once, on both
/// sides of the relationship.
#[test]
fn subscription_is_idempotent_within_a_pass() {
    let slot = Observed::new(2);

    let s = slot.clone();
    let watcher = Watcher::new(move || {
        let mut sum = 0;
        for _ in 0..5 {
            sum += s.get();
        }
        sum
    });

    assert_eq!(watcher.value(), Some(10));
    assert_eq!(slot.dep().subscriber_ids(), vec![watcher.id()]);
    assert_eq!(watcher.dep_ids(), vec![slot.dep().id()]);

    slot.set(3);
    assert_eq!(watcher.value(), Some(15));
    assert_eq!(slot.dep().subscriber_ids(), vec![watcher.id()]);
}

/// A branch that stops reading a slot stops being notified by it.
#[test]
fn flag_controlled_dependency() {
    let flag = Observed::new(true);
    let data = Observed::new(1);

    let (f, d) = (flag.clone(), data.clone());
    let watcher = Watcher::new(move || if f.get() { d.get() } else { -1 });

    assert!(data.dep().has_subscriber(watcher.id()));
    assert_eq!(watcher.value(), Some(1));

    flag.set(false);
    assert_eq!(watcher.value(), Some(-1));
    assert!(!data.dep().has_subscriber(watcher.id()));

    let evaluations = watcher.evaluation_count();
    data.set(100);
    assert_eq!(watcher.evaluation_count(), evaluations);

    // Flipping back resubscribes.
    flag.set(true);
    assert_eq!(watcher.value(), Some(100));
    assert!(data.dep().has_subscriber(watcher.id()));
}

struct Counting {
    id: SubscriberId,
    updates: AtomicUsize,
    hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl Counting {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id: SubscriberId::new(),
            updates: AtomicUsize::new(0),
            hook: Mutex::new(None),
        })
    }
}

impl Subscriber for Counting {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.hook.lock().as_ref() {
            hook();
        }
    }
}

/// A subscriber that unsubscribes a sibling mid-notify does not cause the
/// subscriber after it to be skipped.
#[test]
fn notify_iterates_a_snapshot() {
    let dep = Dep::new();
    let w1 = Counting::new();
    let w2 = Counting::new();
    let w3 = Counting::new();

    let (d, w2_id) = (dep.clone(), w2.id);
    *w1.hook.lock() = Some(Box::new(move || d.remove_sub(w2_id)));

    for sub in [&w1, &w2, &w3] {
        let sub: Arc<dyn Subscriber> = sub.clone();
        dep.add_sub(&sub);
    }

    dep.notify();

    assert_eq!(w3.updates.load(Ordering::SeqCst), 1);
    assert_eq!(dep.subscriber_ids(), vec![w1.id, w3.id]);
}

/// A watcher that re-evaluates synchronously inside notify re-reads the very
/// Dep being notified without disturbing the loop.
#[test]
fn reentrant_resubscription_during_notify() {
    let slot = Observed::new(0);

    let watchers: Vec<Watcher<i32>> = (0..3)
        .map(|offset| {
            let s = slot.clone();
            Watcher::new(move || s.get() + offset)
        })
        .collect();

    slot.set(10);

    for (offset, watcher) in watchers.iter().enumerate() {
        assert_eq!(watcher.value(), Some(10 + offset as i32));
        assert_eq!(watcher.evaluation_count(), 2);
    }
    assert_eq!(slot.dep().subscriber_count(), 3);
}

/// Teardown leaves no subscriptions behind and silences the watcher.
#[test]
fn teardown_releases_every_dep() {
    let d1 = Observed::new(1);
    let d2 = Observed::new(2);
    let fired = Arc::new(AtomicI32::new(0));

    let (a, b, f) = (d1.clone(), d2.clone(), fired.clone());
    let watcher = Watcher::watch(
        move || a.get() + b.get(),
        move |_, _| {
            f.fetch_add(1, Ordering::SeqCst);
        },
    );

    watcher.teardown();

    assert!(!d1.dep().has_subscriber(watcher.id()));
    assert!(!d2.dep().has_subscriber(watcher.id()));

    d1.set(10);
    d2.set(20);
    watcher.update();

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(watcher.value(), Some(3));
}

/// A child watcher built in the middle of a parent's getter does not steal
/// the parent's later reads.
#[test]
fn nested_watcher_restores_parent_target() {
    let head = Observed::new("head");
    let tail = Observed::new("tail");
    let inner = Observed::new("inner");
    let children: Arc<Mutex<Vec<Watcher<&'static str>>>> = Arc::new(Mutex::new(Vec::new()));

    let (h, t, i, kids) = (head.clone(), tail.clone(), inner.clone(), children.clone());
    let parent = Watcher::new(move || {
        let first = h.get();

        let i = i.clone();
        let child = Watcher::new(move || i.get());
        let mut kids = kids.lock();
        kids.clear();
        kids.push(child);
        drop(kids);

        let last = t.get();
        format!("{first}-{last}")
    });

    let child_id = children.lock()[0].id();

    assert_eq!(parent.value().as_deref(), Some("head-tail"));
    assert_eq!(tail.dep().subscriber_ids(), vec![parent.id()]);
    assert_eq!(inner.dep().subscriber_ids(), vec![child_id]);
    assert!(!is_tracking());
}

/// A panicking getter must not leave its watcher on the target stack.
#[test]
fn panicking_getter_does_not_corrupt_tracking() {
    let explode = Arc::new(AtomicBool::new(false));
    let watched = Observed::new(1);
    let bystander = Observed::new(1);

    let (e, w) = (explode.clone(), watched.clone());
    let failing = Watcher::new(move || {
        let value = w.get();
        if e.load(Ordering::SeqCst) {
            panic!("render failed");
        }
        value
    });

    explode.store(true, Ordering::SeqCst);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| failing.get()));
    assert!(result.is_err());

    // A read outside any evaluation must not be attributed to the failed
    // watcher.
    bystander.get();
    assert!(!bystander.dep().has_subscriber(failing.id()));
    assert!(!is_tracking());
}

/// A render watcher reading a computed value is notified by the computed
/// value's sources and sees fresh data.
#[test]
fn render_reads_computed() {
    let first = Observed::new(String::from("Ada"));
    let last = Observed::new(String::from("Lovelace"));

    let (f, l) = (first.clone(), last.clone());
    let full_name = Computed::new(move || format!("{} {}", f.get(), l.get()));

    let renders = Arc::new(Mutex::new(Vec::new()));
    let (name, log) = (full_name.clone(), renders.clone());
    let render = Watcher::new(move || log.lock().push(name.get()));

    last.set(String::from("King"));

    assert_eq!(
        *renders.lock(),
        vec![String::from("Ada Lovelace"), String::from("Ada King")]
    );
    assert!(first.dep().has_subscriber(render.id()));
    assert!(last.dep().has_subscriber(render.id()));
}

/// A render watcher that reads a source before a computed value derived
/// from the same source still sees the fresh computed value.
#[test]
fn render_reading_source_before_computed_sees_fresh_value() {
    let source = Observed::new(1);

    let s = source.clone();
    let doubled = Computed::new(move || s.get() * 2);

    let (s, d) = (source.clone(), doubled.clone());
    let render = Watcher::new(move || s.get() + d.get());

    assert_eq!(render.value(), Some(3));
    assert_eq!(
        source.dep().subscriber_ids(),
        vec![render.id(), doubled.watcher().id()]
    );

    source.set(2);
    assert_eq!(render.value(), Some(6));
    assert!(!doubled.is_dirty());

    source.set(5);
    assert_eq!(render.value(), Some(15));
}

/// A getter that writes to a slot it also reads keeps every dependency it
/// reads, and the watcher ends on the value of its last pass.
#[test]
fn getter_writing_its_own_dep_keeps_every_dep() {
    let input = Observed::new(1);
    let scaled = Observed::new(0);

    let (a, b) = (input.clone(), scaled.clone());
    let watcher = Watcher::new(move || {
        let value = a.get();
        b.set(value * 10);
        b.get()
    });
    assert_eq!(watcher.value(), Some(10));

    input.set(2);
    assert_eq!(watcher.value(), Some(20));
    assert!(input.dep().has_subscriber(watcher.id()));
    assert!(scaled.dep().has_subscriber(watcher.id()));
    assert_eq!(watcher.dependency_count(), 2);

    input.set(3);
    assert_eq!(watcher.value(), Some(30));
    assert_eq!(input.dep().subscriber_ids(), vec![watcher.id()]);
}

/// Watchers on a queue batch any number of writes into one run each, and
/// run in creation order.
#[test]
fn queued_watchers_batch_and_order() {
    let queue = UpdateQueue::new();
    let slot = Observed::new(0);
    let order = Arc::new(Mutex::new(Vec::new()));

    let make = |label: &'static str| {
        let (s, log) = (slot.clone(), order.clone());
        Watcher::builder(move || {
            log.lock().push(label);
            s.get()
        })
        .queue(&queue)
        .build()
    };

    let parent = make("parent");
    let child = make("child");
    order.lock().clear();

    slot.set(1);
    slot.set(2);
    slot.set(3);
    assert!(order.lock().is_empty());

    assert_eq!(queue.flush().unwrap(), 2);
    assert_eq!(*order.lock(), vec!["parent", "child"]);
    assert_eq!(parent.value(), Some(3));
    assert_eq!(child.value(), Some(3));
}

/// A user watcher that writes back to its own source is stopped by the
/// queue's loop guard.
#[test]
fn runaway_watcher_is_detected() {
    let queue = UpdateQueue::with_config(ripple_core::QueueConfig {
        max_update_count: 10,
    });
    let slot = Observed::new(0);

    let (s, writer) = (slot.clone(), slot.clone());
    let _watcher = Watcher::builder(move || s.get())
        .queue(&queue)
        .on_change(move |value, _| {
            writer.set(value + 1);
        })
        .build();

    slot.set(1);
    let err = queue.flush().unwrap_err();

    assert!(matches!(
        err,
        ripple_core::ReactiveError::InfiniteUpdateLoop { limit: 10, .. }
    ));
}

/// Reads inside a `None` target scope are invisible to the enclosing
/// watcher.
#[test]
fn suspended_tracking_inside_watcher() {
    let tracked = Observed::new(1);
    let hidden = Observed::new(2);

    let (t, h) = (tracked.clone(), hidden.clone());
    let watcher = Watcher::new(move || {
        let visible = t.get();
        let _pause = push_target(None);
        visible + h.get()
    });

    assert_eq!(watcher.dep_ids(), vec![tracked.dep().id()]);
    assert_eq!(hidden.dep().subscriber_count(), 0);
}
