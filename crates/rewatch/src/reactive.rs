#![forbid(unsafe_code)]

//! Entry point: build a reactive tree and get its watch/unwrap handles.
//!
//! Every call to [`to_reactive`] owns an independent watcher registry. Nodes
//! from different trees can be stored inside each other; a write always
//! notifies through the registry of the node being written.

use serde_json::Value;

use crate::config::{ConfigError, ReactiveConfig};
use crate::error::ReactiveError;
use crate::node::{self, Change, ReactiveNode, Slot, Tree};
use crate::registry::Cleanup;

/// A reactive tree: the root wrapper plus its watch and unwrap operations.
#[derive(Debug, Clone)]
pub struct Reactive {
    root: ReactiveNode,
}

/// Wrap `data` with the default configuration.
///
/// Passing a node that is already reactive returns a handle to that same
/// node, whatever configuration its tree was built with.
///
/// # Errors
///
/// - [`ReactiveError::NotAnObject`] if `data` is a scalar.
/// - [`ReactiveError::DepthExceeded`] if `data` nests deeper than the
///   default `max_depth`.
pub fn to_reactive(data: impl Into<Slot>) -> Result<Reactive, ReactiveError> {
    match data.into() {
        Slot::Node(root) => Ok(Reactive { root }),
        plain => to_reactive_with(plain, ReactiveConfig::default()),
    }
}

/// Wrap `data` with an explicit configuration.
///
/// Passing a node that is already reactive returns a handle to that same
/// node, provided its tree was built with an equal `config`.
///
/// # Errors
///
/// - [`ReactiveError::InvalidConfig`] if `config` fails validation, or if
///   `data` is a node whose tree uses a different configuration.
/// - [`ReactiveError::NotAnObject`] if `data` is a scalar.
/// - [`ReactiveError::DepthExceeded`] if `data` nests deeper than
///   `config.max_depth`.
pub fn to_reactive_with(
    data: impl Into<Slot>,
    config: ReactiveConfig,
) -> Result<Reactive, ReactiveError> {
    config.validate().map_err(ReactiveError::InvalidConfig)?;
    let root = match data.into() {
        Slot::Node(node) if node.config() != &config => {
            let existing = node.config();
            return Err(ReactiveError::InvalidConfig(vec![ConfigError::new(
                "config",
                format!(
                    "max_depth={} isolate_panics={}",
                    existing.max_depth, existing.isolate_panics
                ),
                "node already belongs to a tree with a different configuration",
            )]));
        }
        Slot::Node(node) => node,
        Slot::Plain(value) => node::wrap(value, &Tree::new(config))?,
    };
    Ok(Reactive { root })
}

/// Register `callback` on the node held by `target`.
///
/// # Errors
///
/// [`ReactiveError::NotReactive`] if `target` is a plain value.
pub fn watch(
    target: &Slot,
    callback: impl Fn(&Change) + 'static,
) -> Result<Cleanup, ReactiveError> {
    match target {
        Slot::Node(node) => Ok(node.watch(callback)),
        Slot::Plain(_) => Err(ReactiveError::NotReactive),
    }
}

impl Reactive {
    /// The root wrapper.
    #[must_use]
    pub fn root(&self) -> &ReactiveNode {
        &self.root
    }

    /// Consume the handle, keeping only the root wrapper.
    #[must_use]
    pub fn into_root(self) -> ReactiveNode {
        self.root
    }

    /// Watch writes on the root node.
    pub fn watch(&self, callback: impl Fn(&Change) + 'static) -> Cleanup {
        self.root.watch(callback)
    }

    /// Deep plain copy of the whole tree.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::DepthExceeded`] if the tree nests past its depth
    /// limit, which construction and `set` both rule out.
    pub fn unwrap(&self) -> Result<Value, ReactiveError> {
        self.root.to_raw()
    }

    /// Configuration the tree was built with.
    #[must_use]
    pub fn config(&self) -> &ReactiveConfig {
        self.root.config()
    }
}
