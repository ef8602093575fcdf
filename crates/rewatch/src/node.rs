#![forbid(unsafe_code)]

//! Reactive wrapper nodes and the factory that builds them.
//!
//! # Design
//!
//! A [`ReactiveNode`] is a cheap handle (`Rc`) to one object or array of the
//! wrapped data. Its backing store is a shallow copy of that container in
//! which every nested object/array has been replaced by a child node, so
//! reading through a parent hands back the child node itself:
//!
//! ```text
//! {"user": {"name": "ada"}, "n": 1}
//!
//! node#0  { user: Node(#1), n: Plain(1) }
//!   └── node#1  { name: Plain("ada") }
//! ```
//!
//! All nodes of one tree share one `Tree`: the watcher registry and the
//! configuration. Watchers are scoped to a single node; a write on `#1` only
//! notifies watchers registered on `#1`.
//!
//! # Invariants
//!
//! 1. A node is never reachable from itself. Assignments that would close a
//!    cycle fail with [`ReactiveError::Cycle`] and leave the node untouched.
//! 2. Watcher lists are snapshotted before the write, so watchers added or
//!    removed during delivery only see later writes.
//! 3. No `RefCell` borrow is held while a watcher runs.
//! 4. Objects assigned after construction are stored as plain values; they
//!    are not promoted to nodes.
//! 5. Every node's subtree fits its headroom: the number of levels left
//!    between the deepest position it has been placed at and `max_depth`.
//!    Grafts are checked against it on every write, watched or not, so a
//!    raw snapshot of any node never exceeds the depth limit.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, debug_span, trace};

use crate::config::ReactiveConfig;
use crate::error::ReactiveError;
use crate::raw;
use crate::registry::{Cleanup, Unregister, WatcherRegistry, fan_out};

/// Identity of a node within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Raw numeric id. The root of a freshly built tree is `0`.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of a slot: a property name or an array position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name:?}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// One entry of a backing store.
#[derive(Clone)]
pub enum Slot {
    /// Plain data: a scalar, or a container that is not reactive.
    Plain(Value),
    /// A reactive child node.
    Node(ReactiveNode),
}

impl Slot {
    /// Whether this slot holds a reactive node.
    #[must_use]
    pub fn is_reactive(&self) -> bool {
        matches!(self, Self::Node(_))
    }

    /// The node, if this slot holds one.
    #[must_use]
    pub fn as_node(&self) -> Option<&ReactiveNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::Plain(_) => None,
        }
    }

    /// The plain value, if this slot holds one.
    #[must_use]
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Node(_) => None,
        }
    }

    /// Consume into the node, if this slot holds one.
    #[must_use]
    pub fn into_node(self) -> Option<ReactiveNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::Plain(_) => None,
        }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

impl From<ReactiveNode> for Slot {
    fn from(node: ReactiveNode) -> Self {
        Self::Node(node)
    }
}

impl From<&ReactiveNode> for Slot {
    fn from(node: &ReactiveNode) -> Self {
        Self::Node(node.clone())
    }
}

/// Plain slots compare by value, node slots by identity.
impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Plain(a), Self::Plain(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Node(node) => f.debug_tuple("Node").field(node).finish(),
        }
    }
}

/// Notification payload for a write on a watched node.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// The property that was written.
    pub key: Key,
    /// Raw snapshot of the whole node before the write.
    pub previous_value: Value,
    /// Raw snapshot of the whole node after the write.
    pub new_value: Value,
}

pub(crate) type WatchFn = dyn Fn(&Change);
pub(crate) type TreeRegistry = RefCell<WatcherRegistry<NodeId, WatchFn>>;

/// State shared by every node of one tree.
pub(crate) struct Tree {
    registry: Rc<TreeRegistry>,
    config: ReactiveConfig,
    next_node: Cell<u64>,
}

impl Tree {
    pub(crate) fn new(config: ReactiveConfig) -> Rc<Self> {
        Rc::new(Self {
            registry: Rc::new(RefCell::new(WatcherRegistry::new())),
            config,
            next_node: Cell::new(0),
        })
    }

    fn mint(&self) -> NodeId {
        let id = self.next_node.get();
        self.next_node.set(id + 1);
        NodeId(id)
    }
}

/// Backing store of one node.
pub(crate) enum Store {
    Object(IndexMap<String, Slot>),
    Array(Vec<Slot>),
}

impl Store {
    fn iter(&self) -> Box<dyn Iterator<Item = (Key, &Slot)> + '_> {
        match self {
            Self::Object(map) => {
                Box::new(map.iter().map(|(k, v)| (Key::Field(k.clone()), v)))
            }
            Self::Array(items) => {
                Box::new(items.iter().enumerate().map(|(i, v)| (Key::Index(i), v)))
            }
        }
    }

    fn children(&self) -> Vec<ReactiveNode> {
        self.iter()
            .filter_map(|(_, slot)| slot.as_node().cloned())
            .collect()
    }
}

struct NodeInner {
    id: NodeId,
    tree: Rc<Tree>,
    headroom: Cell<usize>,
    store: RefCell<Store>,
}

/// Handle to one reactive object or array.
///
/// Cloning the handle does not clone the node: both handles read and write
/// the same backing store and share watchers.
#[derive(Clone)]
pub struct ReactiveNode {
    inner: Rc<NodeInner>,
}

impl fmt::Debug for ReactiveNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.inner.store.borrow();
        let (kind, len) = match &*store {
            Store::Object(map) => ("object", map.len()),
            Store::Array(items) => ("array", items.len()),
        };
        f.debug_struct("ReactiveNode")
            .field("id", &self.inner.id)
            .field("kind", &kind)
            .field("len", &len)
            .finish()
    }
}

impl ReactiveNode {
    /// Identity of this node within its tree.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Whether both handles refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &ReactiveNode) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this node wraps an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(&*self.inner.store.borrow(), Store::Array(_))
    }

    /// Number of slots in the backing store.
    #[must_use]
    pub fn len(&self) -> usize {
        match &*self.inner.store.borrow() {
            Store::Object(map) => map.len(),
            Store::Array(items) => items.len(),
        }
    }

    /// Whether the backing store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in iteration order (insertion order for objects).
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.inner.store.borrow().iter().map(|(key, _)| key).collect()
    }

    /// Shallow copy of the backing store: plain values and child node
    /// handles, in iteration order.
    #[must_use]
    pub fn backing(&self) -> Vec<(Key, Slot)> {
        self.inner
            .store
            .borrow()
            .iter()
            .map(|(key, slot)| (key, slot.clone()))
            .collect()
    }

    /// Read one slot. Nested nodes come back as [`Slot::Node`].
    ///
    /// An index key on an object is read as the decimal property name.
    #[must_use]
    pub fn get(&self, key: impl Into<Key>) -> Option<Slot> {
        match (&*self.inner.store.borrow(), key.into()) {
            (Store::Object(map), Key::Field(name)) => map.get(&name).cloned(),
            (Store::Object(map), Key::Index(index)) => map.get(&index.to_string()).cloned(),
            (Store::Array(items), Key::Index(index)) => items.get(index).cloned(),
            (Store::Array(_), Key::Field(_)) => None,
        }
    }

    /// Read a nested node; `None` if the slot is missing or plain.
    #[must_use]
    pub fn child(&self, key: impl Into<Key>) -> Option<ReactiveNode> {
        self.get(key).and_then(Slot::into_node)
    }

    /// Write one slot and notify this node's watchers.
    ///
    /// Each watcher registered on this node is called once, in registration
    /// order, with raw snapshots of the node taken before and after the
    /// write. Watchers on parent or child nodes are not called.
    ///
    /// # Errors
    ///
    /// - [`ReactiveError::InvalidKey`] if the key does not fit the container
    ///   (field key on an array, or an index past the end of the array).
    /// - [`ReactiveError::Cycle`] if `value` is a node that contains this one.
    /// - [`ReactiveError::DepthExceeded`] if `value` is a node whose subtree
    ///   would nest past `max_depth` at this position.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Slot>) -> Result<(), ReactiveError> {
        let key = key.into();
        let value = value.into();
        let tree = &self.inner.tree;

        let watchers = tree.registry.borrow().matching(&self.inner.id);
        trace!(node = %self.inner.id, key = %key, watchers = watchers.len(), "write");

        if watchers.is_empty() {
            self.assign(&key, value)?;
            return Ok(());
        }

        let previous_value = self.to_raw()?;
        self.assign(&key, value)?;
        let new_value = self.to_raw()?;

        let change = Change {
            key,
            previous_value,
            new_value,
        };
        let _span =
            debug_span!("deliver", node = %self.inner.id, watchers = watchers.len()).entered();
        let report = fan_out(&watchers, tree.config.isolate_panics, |watcher| watcher(&change));
        if report.panicked > 0 {
            debug!(
                delivered = report.delivered,
                panicked = report.panicked,
                "delivery finished with isolated panics"
            );
        }
        Ok(())
    }

    /// Delete an object property without notifying watchers.
    ///
    /// Returns the removed slot, or `None` if the property was absent.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::InvalidKey`] on arrays, which only support `set`.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Slot>, ReactiveError> {
        let key = key.into();
        let mut store = self.inner.store.borrow_mut();
        match (&mut *store, &key) {
            (Store::Object(map), Key::Field(name)) => Ok(map.shift_remove(name)),
            (Store::Object(map), Key::Index(index)) => Ok(map.shift_remove(&index.to_string())),
            (Store::Array(_), _) => Err(ReactiveError::InvalidKey {
                key: key.clone(),
                reason: "array elements cannot be removed",
            }),
        }
    }

    /// Deep raw copy of this node. See [`crate::raw::to_raw`].
    pub fn to_raw(&self) -> Result<Value, ReactiveError> {
        raw::node_to_raw(self, self.inner.tree.config.max_depth)
    }

    /// Register a watcher scoped to this node.
    pub fn watch(&self, callback: impl Fn(&Change) + 'static) -> Cleanup {
        let registry = &self.inner.tree.registry;
        let callback: Rc<WatchFn> = Rc::new(callback);
        let id = registry.borrow_mut().register(self.inner.id, callback);
        debug!(node = %self.inner.id, watcher = id.get(), "watcher registered");
        let weak: Weak<dyn Unregister> = Rc::downgrade(registry) as Weak<dyn Unregister>;
        Cleanup::new(weak, id)
    }

    /// Number of watchers registered on this node.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner.tree.registry.borrow().count_for(&self.inner.id)
    }

    /// Configuration of the tree this node was built in.
    #[must_use]
    pub fn config(&self) -> &ReactiveConfig {
        &self.inner.tree.config
    }

    pub(crate) fn store(&self) -> Ref<'_, Store> {
        self.inner.store.borrow()
    }

    /// Whether `target` is this node or one of its descendants.
    fn reaches(&self, target: &ReactiveNode) -> bool {
        if self.ptr_eq(target) {
            return true;
        }
        let children = self.inner.store.borrow().children();
        children.iter().any(|child| child.reaches(target))
    }

    /// Levels of nesting below and including this node.
    fn height(&self) -> usize {
        let children = self.inner.store.borrow().children();
        1 + children.iter().map(ReactiveNode::height).max().unwrap_or(0)
    }

    /// Lower this subtree's headroom to fit under a parent with `room`
    /// levels left for its children.
    fn settle(&self, room: usize) {
        if room >= self.inner.headroom.get() {
            return;
        }
        self.inner.headroom.set(room);
        let children = self.inner.store.borrow().children();
        for child in &children {
            child.settle(room - 1);
        }
    }

    /// Assign without notifying.
    fn assign(&self, key: &Key, value: Slot) -> Result<(), ReactiveError> {
        let graft = match &value {
            Slot::Node(node) => {
                if node.reaches(self) {
                    return Err(ReactiveError::Cycle {
                        node: self.inner.id,
                    });
                }
                let room = self.inner.headroom.get() - 1;
                if node.height() > room {
                    return Err(ReactiveError::DepthExceeded {
                        limit: self.inner.tree.config.max_depth,
                    });
                }
                Some((node.clone(), room))
            }
            Slot::Plain(_) => None,
        };

        {
            let mut store = self.inner.store.borrow_mut();
            match (&mut *store, key) {
                (Store::Object(map), Key::Field(name)) => {
                    map.insert(name.clone(), value);
                }
                (Store::Object(map), Key::Index(index)) => {
                    map.insert(index.to_string(), value);
                }
                (Store::Array(items), Key::Index(index)) => {
                    if let Some(slot) = items.get_mut(*index) {
                        *slot = value;
                    } else if *index == items.len() {
                        items.push(value);
                    } else {
                        return Err(ReactiveError::InvalidKey {
                            key: key.clone(),
                            reason: "index out of bounds",
                        });
                    }
                }
                (Store::Array(_), Key::Field(_)) => {
                    return Err(ReactiveError::InvalidKey {
                        key: key.clone(),
                        reason: "arrays are indexed by position",
                    });
                }
            }
        }

        if let Some((node, room)) = graft {
            node.settle(room);
        }
        Ok(())
    }
}

/// Build a node tree over `raw`.
///
/// Every object and array inside `raw` becomes its own node; scalars are
/// moved into the backing stores unchanged. No watchers fire.
///
/// # Errors
///
/// - [`ReactiveError::NotAnObject`] if `raw` is a scalar.
/// - [`ReactiveError::DepthExceeded`] if nesting exceeds `max_depth`.
pub(crate) fn wrap(raw: Value, tree: &Rc<Tree>) -> Result<ReactiveNode, ReactiveError> {
    if !is_container(&raw) {
        return Err(ReactiveError::NotAnObject);
    }
    let mut count = 0usize;
    let root = wrap_at(raw, tree, 1, &mut count)?;
    debug!(nodes = count, max_depth = tree.config.max_depth, "reactive tree built");
    Ok(root)
}

fn wrap_at(
    raw: Value,
    tree: &Rc<Tree>,
    depth: usize,
    count: &mut usize,
) -> Result<ReactiveNode, ReactiveError> {
    let limit = tree.config.max_depth;
    if depth > limit {
        return Err(ReactiveError::DepthExceeded { limit });
    }
    let id = tree.mint();
    *count += 1;
    let headroom = limit - depth + 1;

    let mut wrap_child = |value: Value| -> Result<Slot, ReactiveError> {
        if is_container(&value) {
            Ok(Slot::Node(wrap_at(value, tree, depth + 1, count)?))
        } else {
            Ok(Slot::Plain(value))
        }
    };

    let store = match raw {
        Value::Object(map) => {
            let mut backing = IndexMap::with_capacity(map.len());
            for (key, value) in map {
                backing.insert(key, wrap_child(value)?);
            }
            Store::Object(backing)
        }
        Value::Array(items) => Store::Array(
            items
                .into_iter()
                .map(&mut wrap_child)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => return Err(ReactiveError::NotAnObject),
    };

    Ok(ReactiveNode {
        inner: Rc::new(NodeInner {
            id,
            tree: Rc::clone(tree),
            headroom: Cell::new(headroom),
            store: RefCell::new(store),
        }),
    })
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}
