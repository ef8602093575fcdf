#![forbid(unsafe_code)]

//! Raw conversion: turning reactive nodes back into plain data.
//!
//! The result of [`to_raw`] never contains a node and never shares storage
//! with the tree; mutating it cannot affect the tree or its watchers. Each
//! call builds a fresh value (no caching).

use serde_json::{Map, Value};

use crate::error::ReactiveError;
use crate::node::{ReactiveNode, Slot, Store};

/// Whether `slot` holds a reactive node.
#[must_use]
pub fn is_reactive(slot: &Slot) -> bool {
    slot.is_reactive()
}

/// Deep raw copy of `slot`.
///
/// Plain values come back as they are; their contents are not inspected.
/// Nodes are copied recursively, each child node becoming a fresh plain
/// object or array. The depth limit is taken from the node's tree.
///
/// # Errors
///
/// [`ReactiveError::DepthExceeded`] if the node nests deeper than its tree's
/// `max_depth`.
pub fn to_raw(slot: &Slot) -> Result<Value, ReactiveError> {
    match slot {
        Slot::Plain(value) => Ok(value.clone()),
        Slot::Node(node) => node.to_raw(),
    }
}

pub(crate) fn node_to_raw(node: &ReactiveNode, limit: usize) -> Result<Value, ReactiveError> {
    copy_node(node, 1, limit)
}

fn copy_node(node: &ReactiveNode, depth: usize, limit: usize) -> Result<Value, ReactiveError> {
    if depth > limit {
        return Err(ReactiveError::DepthExceeded { limit });
    }

    let copy_slot = |slot: &Slot| match slot {
        Slot::Plain(value) => Ok(value.clone()),
        Slot::Node(child) => copy_node(child, depth + 1, limit),
    };

    let store = node.store();
    match &*store {
        Store::Object(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (name, slot) in entries {
                map.insert(name.clone(), copy_slot(slot)?);
            }
            Ok(Value::Object(map))
        }
        Store::Array(items) => items
            .iter()
            .map(&copy_slot)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
    }
}
