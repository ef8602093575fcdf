#![forbid(unsafe_code)]

//! Watcher registry with identity-based removal and isolated fan-out.
//!
//! # Design
//!
//! [`WatcherRegistry`] is an insertion-ordered list of entries. Each entry
//! carries a scope (which node it observes; `()` for single-value atoms), a
//! callback, and a [`WatcherId`] minted by the registry. Removal goes by id,
//! never by comparing callbacks.
//!
//! Callers never invoke callbacks while the registry is borrowed: they take a
//! snapshot with [`WatcherRegistry::matching`] and hand it to `fan_out`.
//! Registering or cleaning up from inside a callback therefore only affects
//! later deliveries.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Double cleanup | `cleanup()` called twice | Second call is a no-op |
//! | Registry gone | Tree dropped before cleanup | `cleanup()` is a no-op |
//! | Watcher panics | Callback panics during delivery | Logged; later watchers still run if isolated |
//! | Watcher leak | `Cleanup` dropped without calling it | Watcher stays registered |

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

/// Identity of one registration within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Raw numeric id, unique within its registry.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

struct Entry<S, F: ?Sized> {
    id: WatcherId,
    scope: S,
    callback: Rc<F>,
}

/// Ordered collection of scoped watcher callbacks.
pub struct WatcherRegistry<S, F: ?Sized> {
    entries: Vec<Entry<S, F>>,
    next_id: u64,
}

impl<S, F: ?Sized> Default for WatcherRegistry<S, F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }
}

impl<S, F: ?Sized> fmt::Debug for WatcherRegistry<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("entries", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<S: PartialEq, F: ?Sized> WatcherRegistry<S, F> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a watcher for `scope`. Returns its id.
    pub fn register(&mut self, scope: S, callback: Rc<F>) -> WatcherId {
        let id = WatcherId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            scope,
            callback,
        });
        id
    }

    /// Remove the entry with `id`. Returns `false` if it was already gone.
    pub fn unregister(&mut self, id: WatcherId) -> bool {
        match self.entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether `id` is still registered.
    #[must_use]
    pub fn contains(&self, id: WatcherId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Snapshot of the callbacks observing `scope`, in registration order.
    #[must_use]
    pub fn matching(&self, scope: &S) -> Vec<Rc<F>> {
        self.entries
            .iter()
            .filter(|entry| entry.scope == *scope)
            .map(|entry| Rc::clone(&entry.callback))
            .collect()
    }

    /// Number of watchers observing `scope`.
    #[must_use]
    pub fn count_for(&self, scope: &S) -> usize {
        self.entries.iter().filter(|e| e.scope == *scope).count()
    }

    /// Total number of registered watchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no watchers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Type-erased removal, so a [`Cleanup`] does not carry the registry's
/// scope and callback types.
pub(crate) trait Unregister {
    fn unregister(&self, id: WatcherId) -> bool;
    fn contains(&self, id: WatcherId) -> bool;
}

impl<S: PartialEq, F: ?Sized> Unregister for RefCell<WatcherRegistry<S, F>> {
    fn unregister(&self, id: WatcherId) -> bool {
        self.borrow_mut().unregister(id)
    }

    fn contains(&self, id: WatcherId) -> bool {
        self.borrow().contains(id)
    }
}

/// Handle that removes exactly one registration.
///
/// Nothing happens on drop: a watcher stays registered until
/// [`cleanup`](Cleanup::cleanup) runs. Use [`into_guard`](Cleanup::into_guard)
/// for scope-bound removal.
#[must_use = "the watcher stays registered until cleanup() is called"]
#[derive(Clone)]
pub struct Cleanup {
    registry: Weak<dyn Unregister>,
    id: WatcherId,
}

impl Cleanup {
    pub(crate) fn new(registry: Weak<dyn Unregister>, id: WatcherId) -> Self {
        Self { registry, id }
    }

    /// Remove the registration. Calling this again is a no-op.
    pub fn cleanup(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if registry.unregister(self.id) {
            debug!(watcher = self.id.get(), "watcher unregistered");
        }
    }

    /// Id of the registration this handle removes.
    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Whether the registration is still live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }

    /// Convert into a guard that cleans up when dropped.
    pub fn into_guard(self) -> WatchGuard {
        WatchGuard { cleanup: self }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// RAII form of [`Cleanup`]: the watcher is removed when the guard drops.
#[must_use = "dropping the guard unregisters the watcher immediately"]
pub struct WatchGuard {
    cleanup: Cleanup,
}

impl WatchGuard {
    /// Id of the guarded registration.
    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.cleanup.id()
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.cleanup.cleanup();
    }
}

impl fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchGuard")
            .field("id", &self.cleanup.id)
            .finish()
    }
}

/// Outcome of one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FanOut {
    pub delivered: usize,
    pub panicked: usize,
}

/// Invoke every callback in order.
///
/// With `isolate`, each call runs under `catch_unwind`; a panic is logged and
/// delivery moves on to the next callback. Without it, the first panic
/// unwinds out of this function.
pub(crate) fn fan_out<F: ?Sized>(
    callbacks: &[Rc<F>],
    isolate: bool,
    mut invoke: impl FnMut(&F),
) -> FanOut {
    let mut report = FanOut::default();
    for (index, callback) in callbacks.iter().enumerate() {
        if !isolate {
            invoke(callback);
            report.delivered += 1;
            continue;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| invoke(callback))) {
            Ok(()) => report.delivered += 1,
            Err(payload) => {
                report.panicked += 1;
                warn!(
                    position = index,
                    message = %panic_message(payload.as_ref()),
                    "watcher panicked; continuing delivery"
                );
            }
        }
    }
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
