#![forbid(unsafe_code)]

//! Error type shared by wrapping, unwrapping and watcher registration.

use std::fmt;

use crate::config::ConfigError;
use crate::node::{Key, NodeId};

/// Errors from reactive operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    /// A watcher was registered against a plain (non-reactive) value.
    NotReactive,
    /// `to_reactive` was given a scalar; only objects and arrays can be wrapped.
    NotAnObject,
    /// The key does not address a slot of this container.
    InvalidKey { key: Key, reason: &'static str },
    /// A node is reachable from itself, so it has no finite raw form.
    Cycle { node: NodeId },
    /// Nesting went deeper than the configured limit.
    DepthExceeded { limit: usize },
    /// Configuration validation failed.
    InvalidConfig(Vec<ConfigError>),
}

impl fmt::Display for ReactiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReactive => write!(f, "value is not reactive"),
            Self::NotAnObject => write!(f, "only objects and arrays can be made reactive"),
            Self::InvalidKey { key, reason } => write!(f, "invalid key {key}: {reason}"),
            Self::Cycle { node } => write!(f, "cycle detected at node {node}"),
            Self::DepthExceeded { limit } => write!(f, "nesting deeper than {limit} levels"),
            Self::InvalidConfig(errors) => {
                write!(f, "invalid config:")?;
                for error in errors {
                    write!(f, " {error};")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ReactiveError {}
