//! Property-based invariant tests for `Channel` notification.
//!
//! 1. Re-dispatching the stored value never notifies
//! 2. Notification count equals the number of value changes
//! 3. Global subscribers always precede key subscribers
//! 4. Batch dispatch equals sequential single dispatches
//! 5. Unsubscribed callbacks never fire again
//! 6. A panicking subscriber never hides later subscribers

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use metastate_core::{Channel, Schema, Subscription, state_schema};
use proptest::prelude::*;

state_schema! {
    struct Counters(key = CounterKey, entry = CounterEntry, fields = counters) {
        a / A: u8,
        b / B: u8,
        label / Label: String,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn arb_entry() -> impl Strategy<Value = CounterEntry> {
    prop_oneof![
        (0u8..4).prop_map(CounterEntry::A),
        (0u8..4).prop_map(CounterEntry::B),
        prop::sample::select(vec!["x", "y"]).prop_map(|s| CounterEntry::Label(s.to_string())),
    ]
}

fn record_all(channel: &Channel<Counters>) -> (Rc<RefCell<Vec<String>>>, Subscription) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let sub = channel.subscribe_all(move |entry| s.borrow_mut().push(format!("{entry:?}")));
    (seen, sub)
}

/// Expected notifications when `entries` are applied to an empty store.
fn expected_changes(entries: &[CounterEntry]) -> Vec<String> {
    let mut store = Counters::default();
    let mut out = Vec::new();
    for entry in entries {
        let changed = match entry {
            CounterEntry::A(v) => store.a.replace(*v) != Some(*v),
            CounterEntry::B(v) => store.b.replace(*v) != Some(*v),
            CounterEntry::Label(v) => store.label.replace(v.clone()).as_ref() != Some(v),
        };
        if changed {
            out.push(format!("{entry:?}"));
        }
    }
    out
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Same-value dispatch is silent
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn same_value_dispatch_is_silent(value in any::<u8>()) {
        let channel = Channel::with_initial(Counters { a: Some(value), ..Counters::default() });
        let (seen, _sub) = record_all(&channel);
        channel.dispatch(counters::A, value);
        channel.dispatch_with(counters::A, |prev| *prev.unwrap_or(&0));
        prop_assert!(seen.borrow().is_empty());
        prop_assert_eq!(channel.version(), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. One notification per change
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn notifies_once_per_change(entries in proptest::collection::vec(arb_entry(), 0..40)) {
        let channel = Channel::<Counters>::new();
        let (seen, _sub) = record_all(&channel);
        channel.dispatch_entries(entries.clone());

        let expected = expected_changes(&entries);
        prop_assert_eq!(channel.version(), expected.len() as u64);
        prop_assert_eq!(&*seen.borrow(), &expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Ordering
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn globals_precede_key_subscribers(
        globals in 1usize..4,
        keyed in 1usize..4,
        value in any::<u8>(),
    ) {
        let channel = Channel::<Counters>::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Vec::new();

        // Interleave registrations so ordering cannot come from insertion order.
        for i in 0..globals.max(keyed) {
            if i < keyed {
                let o = Rc::clone(&order);
                subs.push(channel.subscribe(counters::A, move |_| o.borrow_mut().push(format!("P{i}"))));
            }
            if i < globals {
                let o = Rc::clone(&order);
                subs.push(channel.subscribe_all(move |_| o.borrow_mut().push(format!("G{i}"))));
            }
        }

        channel.dispatch(counters::A, value);

        let order = order.borrow();
        let expected: Vec<String> = (0..globals)
            .map(|i| format!("G{i}"))
            .chain((0..keyed).map(|i| format!("P{i}")))
            .collect();
        prop_assert_eq!(&*order, &expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Batch equivalence
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn partial_dispatch_matches_sequential(
        seed_a in proptest::option::of(0u8..3),
        a in proptest::option::of(0u8..3),
        b in proptest::option::of(0u8..3),
    ) {
        let seed = Counters { a: seed_a, ..Counters::default() };
        let batch = Channel::with_initial(seed.clone());
        let sequential = Channel::with_initial(seed);
        let (batch_seen, _s1) = record_all(&batch);
        let (seq_seen, _s2) = record_all(&sequential);

        batch.dispatch_partial(Counters { a, b, label: None });
        if let Some(a) = a {
            sequential.dispatch(counters::A, a);
        }
        if let Some(b) = b {
            sequential.dispatch(counters::B, b);
        }

        prop_assert_eq!(&*batch_seen.borrow(), &*seq_seen.borrow());
        prop_assert_eq!(batch.get_value(counters::A), sequential.get_value(counters::A));
        prop_assert_eq!(batch.get_value(counters::B), sequential.get_value(counters::B));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Unsubscribe is final
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn unsubscribed_callback_never_fires(
        before in proptest::collection::vec(any::<u8>(), 0..10),
        after in proptest::collection::vec(any::<u8>(), 0..10),
    ) {
        let channel = Channel::<Counters>::new();
        let hits = Rc::new(Cell::new(0usize));
        let h = Rc::clone(&hits);
        let mut sub = channel.subscribe(counters::B, move |_| h.set(h.get() + 1));

        for v in &before {
            channel.dispatch(counters::B, *v);
        }
        let fired_before = hits.get();
        prop_assert!(fired_before <= before.len());

        sub.unsubscribe();
        for v in &after {
            channel.dispatch(counters::B, v.wrapping_add(1));
        }
        prop_assert_eq!(hits.get(), fired_before);
        prop_assert_eq!(channel.key_subscriber_count(counters::B), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Failure isolation
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn panics_do_not_hide_later_subscribers(panicking in proptest::collection::vec(any::<bool>(), 1..6)) {
        let channel = Channel::<Counters>::new();
        let reached = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Vec::new();
        for (i, should_panic) in panicking.iter().copied().enumerate() {
            let r = Rc::clone(&reached);
            subs.push(channel.subscribe(counters::Label, move |_| {
                if should_panic {
                    panic!("subscriber {i} failed");
                }
                r.borrow_mut().push(i);
            }));
        }

        channel.dispatch(counters::Label, "go".to_string());

        let expected: Vec<usize> = panicking
            .iter()
            .enumerate()
            .filter(|(_, p)| !**p)
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(&*reached.borrow(), &expected);
    }
}

#[test]
fn key_names_round_trip_through_schema() {
    let entry = CounterEntry::Label("z".into());
    assert_eq!(Counters::key_of(&entry), CounterKey::Label);
    assert_eq!(Counters::key_name(CounterKey::B), "b");
}
