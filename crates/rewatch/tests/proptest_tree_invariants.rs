//! Property-based invariant tests for reactive trees.
//!
//! These tests verify invariants that must hold for any plain input:
//!
//! 1. `unwrap(wrap(o)) == o` for every object or array `o`.
//! 2. Every nested container is reachable as a node, every scalar as plain.
//! 3. Mutating an unwrapped copy never changes the tree.
//! 4. A write on the root fires each root watcher exactly once with the
//!    pre-write and post-write snapshots.
//! 5. Writes below the root never fire root watchers.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use rewatch::{Change, ReactiveNode, Slot, to_reactive};
use serde_json::{Map, Value, json};

// ── Strategies ────────────────────────────────────────────────────────────

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,4}", inner, 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn object_strategy() -> impl Strategy<Value = Value> {
    proptest::collection::btree_map("[a-z]{1,4}", value_strategy(), 0..6)
        .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>()))
}

/// Walk `node` alongside `raw`, checking node/plain placement.
fn assert_shape(node: &ReactiveNode, raw: &Value) {
    let children: Vec<(rewatch::Key, &Value)> = match raw {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (rewatch::Key::from(k.as_str()), v))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (rewatch::Key::from(i), v))
            .collect(),
        _ => panic!("nodes only wrap containers"),
    };
    assert_eq!(node.len(), children.len());
    for (key, value) in children {
        match node.get(key) {
            Some(Slot::Node(child)) => {
                assert!(value.is_object() || value.is_array());
                assert_shape(&child, value);
            }
            Some(Slot::Plain(plain)) => {
                assert!(!(value.is_object() || value.is_array()));
                assert_eq!(&plain, value);
            }
            None => panic!("missing slot"),
        }
    }
}

fn first_child(node: &ReactiveNode) -> Option<ReactiveNode> {
    node.backing()
        .into_iter()
        .find_map(|(_, slot)| slot.into_node())
}

proptest! {
    #[test]
    fn unwrap_inverts_wrap(data in object_strategy()) {
        let reactive = to_reactive(data.clone()).unwrap();
        prop_assert_eq!(reactive.unwrap().unwrap(), data);
    }

    #[test]
    fn containers_become_nodes(data in object_strategy()) {
        let reactive = to_reactive(data.clone()).unwrap();
        assert_shape(reactive.root(), &data);
    }

    #[test]
    fn unwrapped_copy_is_detached(data in object_strategy()) {
        let reactive = to_reactive(data.clone()).unwrap();
        let mut copy = reactive.unwrap().unwrap();
        if let Value::Object(map) = &mut copy {
            map.clear();
            map.insert("scribble".into(), json!(true));
        }
        prop_assert_eq!(reactive.unwrap().unwrap(), data);
    }

    #[test]
    fn root_write_fires_each_watcher_once(
        data in object_strategy(),
        key in "[a-z]{1,4}",
        value in scalar_strategy(),
        watchers in 1usize..5,
    ) {
        let reactive = to_reactive(data.clone()).unwrap();
        let log: Rc<RefCell<Vec<(usize, Change)>>> = Rc::new(RefCell::new(Vec::new()));
        let cleanups: Vec<_> = (0..watchers)
            .map(|tag| {
                let log = Rc::clone(&log);
                reactive.watch(move |change| log.borrow_mut().push((tag, change.clone())))
            })
            .collect();

        reactive.root().set(key.as_str(), value.clone()).unwrap();

        let mut expected = data.clone();
        expected[key.as_str()] = value;
        let log = log.borrow();
        prop_assert_eq!(log.len(), watchers);
        for (position, (tag, change)) in log.iter().enumerate() {
            prop_assert_eq!(*tag, position);
            prop_assert_eq!(&change.previous_value, &data);
            prop_assert_eq!(&change.new_value, &expected);
        }
        for cleanup in &cleanups {
            cleanup.cleanup();
        }
    }

    #[test]
    fn child_writes_skip_root_watchers(data in object_strategy(), value in scalar_strategy()) {
        let reactive = to_reactive(data).unwrap();
        let hits = Rc::new(RefCell::new(0u32));
        let sink = Rc::clone(&hits);
        let _cleanup = reactive.watch(move |_| *sink.borrow_mut() += 1);

        if let Some(child) = first_child(reactive.root()) {
            let key: rewatch::Key = if child.is_array() { child.len().into() } else { "k".into() };
            child.set(key, value).unwrap();
        }
        prop_assert_eq!(*hits.borrow(), 0);
    }
}
