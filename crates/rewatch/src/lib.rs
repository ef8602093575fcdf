#![forbid(unsafe_code)]

//! Deep reactive wrappers over plain data.
//!
//! `rewatch` turns a plain [`serde_json::Value`] object graph into a tree of
//! [`ReactiveNode`]s that read like the original data and report every write
//! to the watchers registered on the written node.
//!
//! - [`to_reactive`]: wrap data; returns a [`Reactive`] handle exposing the
//!   root node, `watch` and `unwrap`.
//! - [`watch`]: register a watcher on any node, scoped to that node.
//! - [`is_reactive`] / [`to_raw`]: introspection usable on any [`Slot`].
//! - [`Atom`] / [`create_atom`]: a single-value observable.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use rewatch::to_reactive;
//! use serde_json::json;
//!
//! let state = to_reactive(json!({"user": {"name": "ada"}, "visits": 1})).unwrap();
//! let user = state.root().child("user").unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let cleanup = user.watch(move |change| sink.borrow_mut().push(change.new_value.clone()));
//!
//! user.set("name", json!("grace")).unwrap();
//! state.root().set("visits", json!(2)).unwrap(); // root write: `user` watcher not called
//!
//! assert_eq!(*seen.borrow(), vec![json!({"name": "grace"})]);
//! assert_eq!(
//!     state.unwrap().unwrap(),
//!     json!({"user": {"name": "grace"}, "visits": 2})
//! );
//! cleanup.cleanup();
//! ```
//!
//! # Concurrency
//!
//! Everything is single-threaded (`Rc`/`RefCell`) and synchronous: a write
//! returns only after every matched watcher ran, including nested writes the
//! watchers perform themselves.
//!
//! # Limitations
//!
//! Objects assigned after construction stay plain: `set("k", json!({..}))`
//! stores a [`Slot::Plain`], and writes inside it are not observed. Assign a
//! node (for example the root of another [`to_reactive`] call) to keep
//! observing nested data.

pub mod atom;
pub mod config;
pub mod error;
pub mod node;
pub mod raw;
pub mod reactive;
pub mod registry;

pub use atom::{Atom, create_atom};
pub use config::{ConfigError, ConfigParse, ReactiveConfig};
pub use error::ReactiveError;
pub use node::{Change, Key, NodeId, ReactiveNode, Slot};
pub use raw::{is_reactive, to_raw};
pub use reactive::{Reactive, to_reactive, to_reactive_with, watch};
pub use registry::{Cleanup, WatchGuard, WatcherId, WatcherRegistry};
