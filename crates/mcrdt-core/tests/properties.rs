//! Property-based tests that MUST pass for every container
//!
//! Merging a set of deltas must converge to the same stored state regardless
//! of delivery order and duplication:
//!  - Commutativity: any permutation of the same deltas gives the same state
//!  - Idempotence: replaying deltas already merged changes nothing

use mcrdt_core::{
    CollectionSchemaVersionKey, CompositeDag, Counter, CounterDelta, DataStoreKey, Delta, DocumentStatus,
    LwwRegDelta, LwwRegister, MemoryDatastore, ReplicatedData,
};
use proptest::prelude::*;

fn schema() -> CollectionSchemaVersionKey {
    CollectionSchemaVersionKey::new("schema-v1", 1)
}

fn register() -> LwwRegister {
    LwwRegister::new(MemoryDatastore::shared(), &schema(), DataStoreKey::new(1, "doc", "name"), "name")
}

fn pn_counter() -> Counter<i64> {
    Counter::positive_negative(MemoryDatastore::shared(), &schema(), DataStoreKey::new(1, "doc", "points"), "points")
}

/// Distinct events: each carries a unique merge id.
fn lww_events() -> impl Strategy<Value = Vec<(String, LwwRegDelta)>> {
    prop::collection::vec(("[a-z]{1,6}", 1u64..6), 1..12).prop_map(|writes| {
        writes
            .into_iter()
            .enumerate()
            .map(|(i, (value, priority))| {
                let delta = LwwRegDelta {
                    doc_id: b"doc".to_vec(),
                    field_name: "name".into(),
                    priority,
                    schema_version_id: "schema-v1".into(),
                    data: value.into_bytes(),
                };
                (format!("event-{:03}", i), delta)
            })
            .collect()
    })
}

fn counter_events() -> impl Strategy<Value = Vec<(String, CounterDelta)>> {
    prop::collection::vec((-1000i64..1000, 1u64..20), 1..12).prop_map(|increments| {
        increments
            .into_iter()
            .enumerate()
            .map(|(i, (amount, priority))| {
                let delta = CounterDelta {
                    doc_id: b"doc".to_vec(),
                    field_name: "points".into(),
                    priority,
                    nonce: i as i64,
                    schema_version_id: "schema-v1".into(),
                    data: postcard::to_stdvec(&amount).unwrap(),
                };
                (format!("event-{:03}", i), delta)
            })
            .collect()
    })
}

fn with_permutation<T: Clone + std::fmt::Debug>(
    events: impl Strategy<Value = Vec<T>>,
) -> impl Strategy<Value = (Vec<T>, Vec<T>)> {
    events.prop_flat_map(|events| (Just(events.clone()), Just(events).prop_shuffle()))
}

fn merge_all<C: ReplicatedData>(crdt: &C, events: &[(String, C::Delta)]) {
    for (id, delta) in events {
        crdt.merge(delta, id).unwrap();
    }
}

// ============================================================================
// LWW Register Property Tests
// ============================================================================

proptest! {
    #[test]
    fn lww_merge_is_order_independent((events, shuffled) in with_permutation(lww_events())) {
        let a = register();
        let b = register();
        merge_all(&a, &events);
        merge_all(&b, &shuffled);

        prop_assert_eq!(a.value().unwrap(), b.value().unwrap());
        prop_assert_eq!(a.priority().unwrap(), b.priority().unwrap());
    }

    #[test]
    fn lww_merge_is_idempotent(events in lww_events()) {
        let once = register();
        merge_all(&once, &events);

        let twice = register();
        merge_all(&twice, &events);
        merge_all(&twice, &events);

        prop_assert_eq!(once.value().unwrap(), twice.value().unwrap());
        prop_assert_eq!(once.priority().unwrap(), twice.priority().unwrap());
    }

    #[test]
    fn lww_keeps_highest_priority(events in lww_events()) {
        let reg = register();
        merge_all(&reg, &events);

        let max = events.iter().map(|(_, d)| d.priority()).max().unwrap();
        prop_assert_eq!(reg.priority().unwrap(), max);
    }
}

// ============================================================================
// Counter Property Tests
// ============================================================================

proptest! {
    #[test]
    fn counter_merge_is_order_independent((events, shuffled) in with_permutation(counter_events())) {
        let a = pn_counter();
        let b = pn_counter();
        merge_all(&a, &events);
        merge_all(&b, &shuffled);

        prop_assert_eq!(a.value().unwrap(), b.value().unwrap());
        prop_assert_eq!(a.priority().unwrap(), b.priority().unwrap());
    }

    #[test]
    fn counter_duplicate_delivery_is_idempotent(events in counter_events()) {
        let counter = pn_counter();
        merge_all(&counter, &events);
        merge_all(&counter, &events);

        let expected = events
            .iter()
            .map(|(_, d)| postcard::from_bytes::<i64>(&d.data).unwrap())
            .fold(0i64, |acc, x| acc.wrapping_add(x));
        prop_assert_eq!(counter.value().unwrap(), expected);
    }

    #[test]
    fn grow_only_counter_never_decreases(amounts in prop::collection::vec(-50i64..50, 1..20)) {
        let counter: Counter<i64> =
            Counter::grow_only(MemoryDatastore::shared(), &schema(), DataStoreKey::new(1, "doc", "hits"), "hits");
        let mut last = 0;
        for (i, amount) in amounts.into_iter().enumerate() {
            match counter.increment(amount) {
                Ok(delta) => counter.merge(&delta, &format!("event-{}", i)).unwrap(),
                Err(_) => prop_assert!(amount < 0),
            }
            let now = counter.value().unwrap();
            prop_assert!(now >= last);
            last = now;
        }
    }
}

// ============================================================================
// Composite Property Tests
// ============================================================================

proptest! {
    #[test]
    fn composite_status_is_order_independent(
        (statuses, shuffled) in with_permutation(prop::collection::vec((any::<bool>(), 1u64..10), 1..8))
    ) {
        let build = |items: &[(bool, u64)]| {
            let dag = CompositeDag::new(MemoryDatastore::shared(), &schema(), DataStoreKey::new(1, "doc", ""));
            for (i, (deleted, priority)) in items.iter().enumerate() {
                let mut delta = if *deleted { dag.delete(vec![]).unwrap() } else { dag.set(Vec::new(), vec![]).unwrap() };
                delta.set_priority(*priority);
                dag.merge(&delta, &format!("event-{}", i)).unwrap();
            }
            (dag.status().unwrap(), dag.priority().unwrap())
        };

        let a = build(&statuses);
        let b = build(&shuffled);
        prop_assert_eq!(a, b);
        let any_deleted = statuses.iter().any(|(deleted, _)| *deleted);
        prop_assert_eq!(a.0 == Some(DocumentStatus::Deleted), any_deleted);
    }
}
