//! Dataref cache and subscription dispatch engine.
//!
//! Holds last-known dataref values and the registered subscriptions, and
//! decides which subscriptions fire when a batch of updates arrives.
//!
//! # Dispatch Rules
//!
//! For each subscription, in registration order:
//!
//! - A subscription is *touched* by a batch when at least one of its
//!   datarefs is present in the batch. Presence alone is sufficient; the
//!   incoming value is not compared against the cache.
//! - A touched subscription whose `min_delta_time` has not elapsed since
//!   it last fired ends the pass: the remaining subscriptions are not
//!   evaluated until the next batch. This mirrors the reference client's
//!   shared loop exit and is relied upon by deployed instruments.
//! - A firing subscription receives positional arguments in its declared
//!   dataref order: the incoming value when present, the cached value
//!   otherwise, 0.0 when neither exists.
//!
//! After the pass, the batch is merged into the cache.
//!
//! Evaluation and invocation are split: [`DispatchEngine::evaluate_batch`]
//! runs under the engine lock and returns pending [`Firing`]s, which the
//! event loop invokes after releasing it. Callbacks therefore hold no
//! engine lock and may call back into the client.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::SubscriptionId;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with positional dataref values when a subscription
/// fires. Argument order matches the subscription's declared dataref order.
pub type DatarefCallback = Box<dyn FnMut(&[f64]) + Send>;

/// Callback slot shared between the engine and in-flight firings.
type SharedCallback = Arc<Mutex<DatarefCallback>>;

// ============================================================================
// Subscription
// ============================================================================

/// A registered dataref subscription.
///
/// Lives for the client; there is no unsubscribe operation for dataref
/// subscriptions.
struct Subscription {
    /// Unique identifier.
    id: SubscriptionId,
    /// Watched datarefs, in callback argument order.
    datarefs: Vec<String>,
    /// Minimum seconds between firings; 0 = unthrottled.
    min_delta_time: f64,
    /// When the subscription last fired (or was registered).
    last_fired: Instant,
    /// Listener callback.
    callback: SharedCallback,
}

// ============================================================================
// Firing
// ============================================================================

/// One pending callback invocation produced by a dispatch pass.
///
/// Returned by [`DispatchEngine::evaluate_batch`] so the caller can invoke
/// callbacks after the engine lock is released.
pub(crate) struct Firing {
    callback: SharedCallback,
    args: Vec<f64>,
}

impl Firing {
    /// Invokes the callback with its positional arguments.
    pub(crate) fn invoke(self) {
        (*self.callback.lock())(&self.args);
    }
}

// ============================================================================
// DispatchEngine
// ============================================================================

/// Dataref cache plus subscription set.
///
/// Mutated only by the client event loop; shared behind a mutex with the
/// API handle for registration and cache reads.
pub(crate) struct DispatchEngine {
    /// Last-known value per dataref name.
    cache: FxHashMap<String, f64>,
    /// Subscriptions in registration (evaluation) order.
    subscriptions: Vec<Subscription>,
}

impl DispatchEngine {
    /// Creates an empty engine.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            cache: FxHashMap::default(),
            subscriptions: Vec::new(),
        }
    }

    /// Registers a subscription and returns its identifier.
    ///
    /// Cache entries for datarefs not yet cached are initialized to 0.0,
    /// so every dataref referenced by an active subscription has an entry.
    pub(crate) fn register(
        &mut self,
        datarefs: Vec<String>,
        min_delta_time: f64,
        callback: DatarefCallback,
        now: Instant,
    ) -> SubscriptionId {
        let id = SubscriptionId::generate();

        for dataref in &datarefs {
            self.cache.entry(dataref.clone()).or_insert(0.0);
        }

        trace!(%id, count = datarefs.len(), "Subscription registered");

        self.subscriptions.push(Subscription {
            id,
            datarefs,
            min_delta_time,
            last_fired: now,
            callback: Arc::new(Mutex::new(callback)),
        });

        id
    }

    /// Evaluates all subscriptions against an update batch, merges the
    /// batch into the cache, and returns the callbacks due to fire.
    ///
    /// Callbacks are not invoked here; the caller invokes the returned
    /// [`Firing`]s once the engine lock is released.
    #[must_use]
    pub(crate) fn evaluate_batch(
        &mut self,
        values: &FxHashMap<String, f64>,
        now: Instant,
    ) -> Vec<Firing> {
        let mut firings = Vec::new();

        for subscription in &mut self.subscriptions {
            let touched = subscription
                .datarefs
                .iter()
                .any(|name| values.contains_key(name));
            if !touched {
                continue;
            }

            // A throttled subscriber ends the pass for all later
            // subscribers as well.
            if subscription.min_delta_time != 0.0 {
                let elapsed = now.duration_since(subscription.last_fired).as_secs_f64();
                if elapsed < subscription.min_delta_time {
                    trace!(id = %subscription.id, elapsed, "Throttled, ending pass");
                    break;
                }
            }

            let args: Vec<f64> = subscription
                .datarefs
                .iter()
                .map(|name| {
                    values
                        .get(name)
                        .or_else(|| self.cache.get(name))
                        .copied()
                        .unwrap_or(0.0)
                })
                .collect();

            subscription.last_fired = now;
            firings.push(Firing {
                callback: Arc::clone(&subscription.callback),
                args,
            });
        }

        // Incoming values overwrite; absent keys are left untouched.
        for (name, value) in values {
            self.cache.insert(name.clone(), *value);
        }

        firings
    }

    /// Returns the last-known value for a dataref, if any.
    #[inline]
    pub(crate) fn last_known(&self, dataref: &str) -> Option<f64> {
        self.cache.get(dataref).copied()
    }

    /// Returns the number of registered subscriptions.
    #[cfg(test)]
    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    type CallLog = Arc<Mutex<Vec<Vec<f64>>>>;

    fn recording_callback(log: &CallLog) -> DatarefCallback {
        let log = Arc::clone(log);
        Box::new(move |args| log.lock().push(args.to_vec()))
    }

    fn batch(entries: &[(&str, f64)]) -> FxHashMap<String, f64> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect()
    }

    /// Evaluates a batch and invokes everything due, like the event loop.
    fn run_batch(engine: &mut DispatchEngine, values: &FxHashMap<String, f64>, now: Instant) {
        for firing in engine.evaluate_batch(values, now) {
            firing.invoke();
        }
    }

    #[test]
    fn test_register_initializes_cache_to_zero() {
        let mut engine = DispatchEngine::new();
        let log = CallLog::default();

        engine.register(
            vec!["a".to_string(), "b".to_string()],
            0.0,
            recording_callback(&log),
            Instant::now(),
        );

        assert_eq!(engine.last_known("a"), Some(0.0));
        assert_eq!(engine.last_known("b"), Some(0.0));
        assert_eq!(engine.last_known("c"), None);
        assert_eq!(engine.subscription_count(), 1);
    }

    #[test]
    fn test_fires_with_positional_args_and_cache_fallback() {
        let mut engine = DispatchEngine::new();
        let log = CallLog::default();
        let now = Instant::now();

        engine.register(
            vec!["a".to_string(), "b".to_string()],
            0.0,
            recording_callback(&log),
            now,
        );

        run_batch(&mut engine, &batch(&[("a", 5.0)]), now);

        // "b" was never received; its cache entry defaults to 0.
        assert_eq!(log.lock().as_slice(), &[vec![5.0, 0.0]]);
        assert_eq!(engine.last_known("a"), Some(5.0));
    }

    #[test]
    fn test_cached_value_used_for_absent_dataref() {
        let mut engine = DispatchEngine::new();
        let log = CallLog::default();
        let now = Instant::now();

        engine.register(
            vec!["a".to_string(), "b".to_string()],
            0.0,
            recording_callback(&log),
            now,
        );

        run_batch(&mut engine, &batch(&[("b", 3.0)]), now);
        run_batch(&mut engine, &batch(&[("a", 1.0)]), now);

        assert_eq!(log.lock().as_slice(), &[vec![0.0, 3.0], vec![1.0, 3.0]]);
    }

    #[test]
    fn test_untouched_subscription_does_not_fire() {
        let mut engine = DispatchEngine::new();
        let log = CallLog::default();
        let now = Instant::now();

        engine.register(vec!["x".to_string()], 0.0, recording_callback(&log), now);

        run_batch(&mut engine, &batch(&[("y", 9.0)]), now);

        assert!(log.lock().is_empty());
        // The batch still merges into the cache.
        assert_eq!(engine.last_known("y"), Some(9.0));
    }

    #[test]
    fn test_presence_alone_fires_even_without_value_change() {
        let mut engine = DispatchEngine::new();
        let log = CallLog::default();
        let now = Instant::now();

        engine.register(vec!["a".to_string()], 0.0, recording_callback(&log), now);

        run_batch(&mut engine, &batch(&[("a", 7.0)]), now);
        run_batch(&mut engine, &batch(&[("a", 7.0)]), now);

        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_throttled_subscription_ends_pass() {
        let mut engine = DispatchEngine::new();
        let log1 = CallLog::default();
        let log2 = CallLog::default();
        let log3 = CallLog::default();

        let registered = Instant::now();
        engine.register(
            vec!["a".to_string()],
            0.0,
            recording_callback(&log1),
            registered,
        );
        engine.register(
            vec!["a".to_string()],
            10.0,
            recording_callback(&log2),
            registered,
        );
        engine.register(
            vec!["a".to_string()],
            0.0,
            recording_callback(&log3),
            registered,
        );

        // One second later: the 10s throttle on S2 has not elapsed.
        let now = registered + Duration::from_secs(1);
        run_batch(&mut engine, &batch(&[("a", 1.0)]), now);

        assert_eq!(log1.lock().len(), 1);
        assert_eq!(log2.lock().len(), 0);
        // S3 is also skipped: the throttled subscriber ends the pass.
        assert_eq!(log3.lock().len(), 0);
    }

    #[test]
    fn test_throttle_elapsed_fires_and_resets() {
        let mut engine = DispatchEngine::new();
        let log = CallLog::default();

        let registered = Instant::now();
        engine.register(
            vec!["a".to_string()],
            2.0,
            recording_callback(&log),
            registered,
        );

        run_batch(&mut engine, &batch(&[("a", 1.0)]), registered + Duration::from_secs(3));
        assert_eq!(log.lock().len(), 1);

        // One second after firing: throttled again.
        run_batch(&mut engine, &batch(&[("a", 2.0)]), registered + Duration::from_secs(4));
        assert_eq!(log.lock().len(), 1);

        run_batch(&mut engine, &batch(&[("a", 3.0)]), registered + Duration::from_secs(6));
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_callbacks_run_only_when_firings_are_invoked() {
        let mut engine = DispatchEngine::new();
        let log = CallLog::default();
        let now = Instant::now();

        engine.register(vec!["a".to_string()], 0.0, recording_callback(&log), now);

        // Evaluation alone must not touch the callback; the event loop
        // invokes firings only after releasing the engine lock, so a
        // callback is free to re-enter the engine.
        let firings = engine.evaluate_batch(&batch(&[("a", 1.0)]), now);
        assert!(log.lock().is_empty());
        assert_eq!(engine.last_known("a"), Some(1.0));

        for firing in firings {
            firing.invoke();
        }
        assert_eq!(log.lock().as_slice(), &[vec![1.0]]);
    }

    #[test]
    fn test_cache_merge_preserves_absent_keys() {
        let mut engine = DispatchEngine::new();
        let now = Instant::now();

        run_batch(&mut engine, &batch(&[("a", 1.0), ("b", 2.0)]), now);
        run_batch(&mut engine, &batch(&[("a", 10.0)]), now);

        assert_eq!(engine.last_known("a"), Some(10.0));
        assert_eq!(engine.last_known("b"), Some(2.0));
    }
}
