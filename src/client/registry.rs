//! Command callback registry and one-shot request queue.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::identifiers::CallbackId;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked when a registered simulator command fires.
pub type CommandCallback = Box<dyn FnMut() + Send>;

/// Callback slot shared between the registry and in-flight notifications.
pub(crate) type SharedCommandCallback = Arc<Mutex<CommandCallback>>;

/// Callback resolving a one-shot dataref read with the raw response
/// payload.
pub type OnceCallback = Box<dyn FnOnce(Value) + Send>;

// ============================================================================
// CommandRegistry
// ============================================================================

/// Maps command names to their registered callbacks.
///
/// Cleared entirely when a server-initiated redirect replaces the
/// transport; dataref subscriptions survive redirects, command callbacks
/// do not.
///
/// Lookup and invocation are split: [`callbacks_for`] runs under the
/// registry lock and returns shared callback slots, which the event loop
/// invokes after releasing it. Callbacks may therefore register or remove
/// further callbacks.
///
/// [`callbacks_for`]: CommandRegistry::callbacks_for
pub(crate) struct CommandRegistry {
    callbacks: FxHashMap<String, FxHashMap<CallbackId, SharedCommandCallback>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            callbacks: FxHashMap::default(),
        }
    }

    /// Stores a callback under a command name and returns its identifier.
    pub(crate) fn register(&mut self, command: &str, callback: CommandCallback) -> CallbackId {
        let id = CallbackId::generate();
        self.callbacks
            .entry(command.to_string())
            .or_default()
            .insert(id, Arc::new(Mutex::new(callback)));

        trace!(command, %id, "Command callback registered");
        id
    }

    /// Removes exactly one callback entry.
    ///
    /// Removing an entry that no longer exists is a no-op.
    pub(crate) fn remove(&mut self, command: &str, id: CallbackId) {
        if let Some(entries) = self.callbacks.get_mut(command) {
            entries.remove(&id);
            if entries.is_empty() {
                self.callbacks.remove(command);
            }
        }
    }

    /// Returns the callbacks registered for a command, in unspecified
    /// order, for invocation after the registry lock is released.
    #[must_use]
    pub(crate) fn callbacks_for(&self, command: &str) -> Vec<SharedCommandCallback> {
        match self.callbacks.get(command) {
            Some(entries) => entries.values().map(Arc::clone).collect(),
            None => Vec::new(),
        }
    }

    /// Removes all callbacks for all commands.
    pub(crate) fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// Returns `true` if no callbacks are registered.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

// ============================================================================
// OnceQueue
// ============================================================================

/// Pending one-shot dataref read callbacks, strictly FIFO.
///
/// Correlation with `ONCE` responses is positional: the nth outstanding
/// request is resolved by the nth response, regardless of content.
pub(crate) struct OnceQueue {
    pending: VecDeque<OnceCallback>,
}

impl OnceQueue {
    /// Creates an empty queue.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// Enqueues a callback awaiting the next unclaimed response.
    pub(crate) fn push(&mut self, callback: OnceCallback) {
        self.pending.push_back(callback);
    }

    /// Dequeues the oldest pending callback.
    pub(crate) fn pop(&mut self) -> Option<OnceCallback> {
        self.pending.pop_front()
    }

    /// Returns the number of outstanding requests.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback(counter: &Arc<AtomicUsize>) -> CommandCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Looks up and invokes a command's callbacks, like the event loop.
    fn notify(registry: &CommandRegistry, command: &str) -> usize {
        let callbacks = registry.callbacks_for(command);
        for callback in &callbacks {
            (*callback.lock())();
        }
        callbacks.len()
    }

    #[test]
    fn test_notify_fans_out_to_all_callbacks() {
        let mut registry = CommandRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.register("sim/flight_controls/gear_toggle", counting_callback(&first));
        registry.register("sim/flight_controls/gear_toggle", counting_callback(&second));

        let invoked = notify(&registry, "sim/flight_controls/gear_toggle");

        assert_eq!(invoked, 2);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notify_unknown_command_is_noop() {
        let registry = CommandRegistry::new();
        assert_eq!(notify(&registry, "sim/none"), 0);
    }

    #[test]
    fn test_callbacks_survive_registry_mutation_during_invocation() {
        let mut registry = CommandRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let id = registry.register("cmd", counting_callback(&counter));
        let callbacks = registry.callbacks_for("cmd");

        // The registry can change between lookup and invocation; already
        // collected callbacks still run.
        registry.remove("cmd", id);
        for callback in &callbacks {
            (*callback.lock())();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_deletes_exactly_one_entry() {
        let mut registry = CommandRegistry::new();
        let kept = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));

        registry.register("cmd", counting_callback(&kept));
        let id = registry.register("cmd", counting_callback(&removed));

        registry.remove("cmd", id);
        notify(&registry, "cmd");

        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 0);

        // Removing again is a no-op.
        registry.remove("cmd", id);
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut registry = CommandRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.register("cmd", counting_callback(&counter));
        assert!(!registry.is_empty());

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(notify(&registry, "cmd"), 0);
    }

    #[test]
    fn test_once_queue_is_fifo() {
        let mut queue = OnceQueue::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            queue.push(Box::new(move |value| {
                order.lock().push((tag, value));
            }));
        }
        assert_eq!(queue.len(), 2);

        queue.pop().expect("pending")(serde_json::json!(1));
        queue.pop().expect("pending")(serde_json::json!(2));
        assert!(queue.pop().is_none());

        let order = order.lock();
        assert_eq!(order[0], ("first", serde_json::json!(1)));
        assert_eq!(order[1], ("second", serde_json::json!(2)));
    }
}
