#![forbid(unsafe_code)]

//! Single-value observable.
//!
//! # Design
//!
//! [`Atom<T>`] keeps one value in shared, reference-counted storage
//! (`Rc<RefCell<..>>`). [`Atom::update`] replaces the value and calls every
//! watcher with `(new, previous)` in registration order. Unlike a node
//! write, there is no equality check: every update notifies.
//!
//! An atom is the degenerate case of a reactive tree with a single slot and
//! a single scope, and it reuses the same [`WatcherRegistry`] and fan-out.
//!
//! # Failure Modes
//!
//! - **Re-entrant update**: calling `update()` from a watcher is allowed; the
//!   nested update is fully delivered before the outer delivery resumes.
//!   Outer watchers later in the list still receive the outer `(new,
//!   previous)` pair.
//! - **Update closure reads the atom**: allowed; the closure runs before the
//!   value is borrowed for writing.
//! - **Write inside `with()`**: calling `update()` or `set()` from the
//!   closure passed to [`Atom::with`] will panic (RefCell borrow rules),
//!   because the value stays borrowed for the whole closure. Clone the value
//!   out with [`Atom::get`] first.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::config::ReactiveConfig;
use crate::registry::{Cleanup, Unregister, WatcherRegistry, fan_out};

type AtomWatchFn<T> = dyn Fn(&T, &T);
type AtomRegistry<T> = RefCell<WatcherRegistry<(), AtomWatchFn<T>>>;

struct AtomInner<T> {
    value: T,
    version: u64,
}

/// A shared value with synchronous change notification.
///
/// Cloning an `Atom` creates a new handle to the **same** value and watchers.
pub struct Atom<T> {
    inner: Rc<RefCell<AtomInner<T>>>,
    watchers: Rc<AtomRegistry<T>>,
    isolate_panics: bool,
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            watchers: Rc::clone(&self.watchers),
            isolate_panics: self.isolate_panics,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Atom")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("watcher_count", &self.watchers.borrow().len())
            .finish()
    }
}

/// Create an atom and return its initial value alongside it.
pub fn create_atom<T: Clone + 'static>(initial: T) -> (T, Atom<T>) {
    let atom = Atom::new(initial.clone());
    (initial, atom)
}

impl<T: Clone + 'static> Atom<T> {
    /// Create an atom with the default configuration.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_config(value, &ReactiveConfig::default())
    }

    /// Create an atom honoring `config.isolate_panics`.
    #[must_use]
    pub fn with_config(value: T, config: &ReactiveConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(AtomInner { value, version: 0 })),
            watchers: Rc::new(RefCell::new(WatcherRegistry::new())),
            isolate_panics: config.isolate_panics,
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// If `f` writes to this atom.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value with `f(previous)` and notify every watcher with
    /// `(new, previous)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let previous = self.get();
        let next = f(&previous);
        let version = {
            let mut inner = self.inner.borrow_mut();
            inner.value = next.clone();
            inner.version += 1;
            inner.version
        };

        let watchers = self.watchers.borrow().matching(&());
        trace!(version, watchers = watchers.len(), "atom updated");
        fan_out(&watchers, self.isolate_panics, |watcher| {
            watcher(&next, &previous)
        });
    }

    /// Replace the value outright. Shorthand for `update(|_| value)`.
    pub fn set(&self, value: T) {
        self.update(move |_| value);
    }

    /// Register a watcher called with `(new, previous)` on every update.
    pub fn watch(&self, callback: impl Fn(&T, &T) + 'static) -> Cleanup {
        let callback: Rc<AtomWatchFn<T>> = Rc::new(callback);
        let id = self.watchers.borrow_mut().register((), callback);
        debug!(watcher = id.get(), "atom watcher registered");
        let weak: Weak<dyn Unregister> = Rc::downgrade(&self.watchers) as Weak<dyn Unregister>;
        Cleanup::new(weak, id)
    }

    /// Number of updates applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    #[should_panic(expected = "already borrowed")]
    fn write_inside_with_panics() {
        let (_, atom) = create_atom(1);
        atom.with(|_| atom.set(2));
    }

    #[test]
    fn create_returns_initial_value() {
        let (value, atom) = create_atom(7);
        assert_eq!(value, 7);
        assert_eq!(atom.get(), 7);
        assert_eq!(atom.version(), 0);
    }

    #[test]
    fn update_notifies_new_then_previous() {
        let (_, atom) = create_atom(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _cleanup = atom.watch(move |new, previous| sink.borrow_mut().push((*new, *previous)));

        atom.update(|v| v + 1);
        atom.update(|v| v * 10);
        assert_eq!(*seen.borrow(), vec![(1, 0), (10, 1)]);
        assert_eq!(atom.version(), 2);
    }

    #[test]
    fn equal_values_still_notify() {
        let atom = Atom::new(5);
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let _cleanup = atom.watch(move |_, _| h.set(h.get() + 1));

        atom.set(5);
        assert_eq!(hits.get(), 1);
        assert_eq!(atom.version(), 1);
    }

    #[test]
    fn cleanup_before_update_silences_watcher() {
        let (_, atom) = create_atom(0);
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let cleanup = atom.watch(move |_, _| h.set(h.get() + 1));

        cleanup.cleanup();
        cleanup.cleanup();
        atom.update(|v| v + 1);
        assert_eq!(hits.get(), 0);
        assert_eq!(atom.watcher_count(), 0);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let atom = Atom::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut cleanups = Vec::new();
        for tag in ['A', 'B', 'C'] {
            let log = Rc::clone(&log);
            cleanups.push(atom.watch(move |_, _| log.borrow_mut().push(tag)));
        }

        atom.set(1);
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn clone_shares_value_and_watchers() {
        let atom = Atom::new(String::from("a"));
        let other = atom.clone();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let _cleanup = atom.watch(move |_, _| h.set(h.get() + 1));

        other.set(String::from("b"));
        assert_eq!(atom.get(), "b");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn reentrant_update_nests() {
        let atom = Atom::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_atom = atom.clone();
        let first_log = Rc::clone(&log);
        let _first = atom.watch(move |new, previous| {
            first_log.borrow_mut().push((*new, *previous));
            if *new == 1 {
                inner_atom.set(2);
            }
        });
        let second_log = Rc::clone(&log);
        let _second = atom.watch(move |new, previous| {
            second_log.borrow_mut().push((*new, *previous));
        });

        atom.set(1);
        assert_eq!(*log.borrow(), vec![(1, 0), (2, 1), (2, 1), (1, 0)]);
        assert_eq!(atom.get(), 2);
    }

    #[test]
    fn update_closure_may_read_atom() {
        let atom = Atom::new(3);
        let reader = atom.clone();
        atom.update(move |v| v + reader.get());
        assert_eq!(atom.get(), 6);
    }

    #[test]
    fn debug_format() {
        let atom = Atom::new(42);
        let dbg = format!("{atom:?}");
        assert!(dbg.contains("Atom"));
        assert!(dbg.contains("42"));
        assert!(dbg.contains("version"));
    }
}
