//! Property tests for the tracking laws: stack restoration, idempotent
//! subscription, and fine-grained unsubscription.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use ripple_core::reactive::{
    current_subscriber, depth, is_tracking, push_target, Dep, Observed, Subscriber, SubscriberId,
    Target, Watcher,
};

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

/// One push, the pushes nested inside it, then the matching pop.
#[derive(Debug, Clone)]
struct Frame {
    tracked: bool,
    children: Vec<Frame>,
}

fn frame() -> impl Strategy<Value = Frame> {
    let leaf = any::<bool>().prop_map(|tracked| Frame {
        tracked,
        children: Vec::new(),
    });

    leaf.prop_recursive(6, 64, 4, |inner| {
        (any::<bool>(), prop::collection::vec(inner, 0..4))
            .prop_map(|(tracked, children)| Frame { tracked, children })
    })
}

fn enter(frame: &Frame) {
    let before = current_subscriber();
    let depth_before = depth();

    {
        let target = frame
            .tracked
            .then(|| Arc::new(Probe(SubscriberId::new())) as Arc<dyn Target>);
        let expected = target.as_ref().map(|t| t.id());

        let _guard = push_target(target);
        assert_eq!(current_subscriber(), expected);
        assert_eq!(depth(), depth_before + 1);

        for child in &frame.children {
            enter(child);
            assert_eq!(current_subscriber(), expected);
        }
    }

    assert_eq!(current_subscriber(), before);
    assert_eq!(depth(), depth_before);
}

const SLOTS: usize = 5;

proptest! {
    #[test]
    fn balanced_pushes_restore_target(frames in prop::collection::vec(frame(), 1..4)) {
        for frame in &frames {
            enter(frame);
        }

        prop_assert!(!is_tracking());
        prop_assert_eq!(depth(), 0);
    }

    #[test]
    fn subscriptions_match_last_pass(
        passes in prop::collection::vec(prop::collection::vec(0..SLOTS, 0..12), 1..8)
    ) {
        let slots: Vec<Observed<i32>> = (0..SLOTS as i32).map(Observed::new).collect();
        let reads: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let (s, r) = (slots.clone(), reads.clone());
        let watcher = Watcher::new(move || {
            let indices = r.lock().clone();
            indices.iter().map(|&i| s[i].get()).sum::<i32>()
        });

        for pass in passes {
            *reads.lock() = pass.clone();
            watcher.get();

            let read: BTreeSet<usize> = pass.into_iter().collect();
            for (index, slot) in slots.iter().enumerate() {
                let entries = slot
                    .dep()
                    .subscriber_ids()
                    .into_iter()
                    .filter(|id| *id == watcher.id())
                    .count();
                let expected = usize::from(read.contains(&index));
                prop_assert_eq!(entries, expected);
            }
            prop_assert_eq!(watcher.dependency_count(), read.len());
        }

        watcher.teardown();
        for slot in &slots {
            prop_assert_eq!(slot.dep().subscriber_count(), 0);
        }
    }
}
