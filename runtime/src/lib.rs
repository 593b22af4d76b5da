//! # Slotpay Runtime
//!
//! Runtime for the Slotpay booking pipeline.
//!
//! This crate provides the [`Store`] that owns reducer state, runs the reducer
//! for each action, and executes the returned effects, feeding any produced
//! action back into the reducer. It also provides the bounded retry policy used
//! by the payment status poller.
//!
//! ## Example
//!
//! ```ignore
//! use slotpay_runtime::Store;
//!
//! let store = Store::new(BookingState::default(), BookingReducer::new(), env);
//!
//! // Send an action and wait for its write-through effect
//! let mut handle = store.send(BookingAction::Request { booking_id, event }).await?;
//! handle.wait().await;
//!
//! // Read state
//! let status = store.state(|s| s.status_of(&booking_id)).await;
//! ```

use slotpay_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Bounded retry with exponential backoff
pub mod retry;

pub use error::StoreError;
pub use retry::{RetryBudget, RetryPolicy};
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for effects to complete
        #[error("Timeout waiting for effects")]
        Timeout,
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] so callers can wait until every effect
/// spawned by that action (including the reduction of any action it fed back)
/// has finished.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Keeps the counter honest even if the effect task panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreError,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent readers)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Clones share the same state, so a single store can be handed to the
    /// redirect reconciler, the poller and the UI layer at once.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Send an action to the store
        ///
        /// The reducer runs under the write lock; effects are executed after
        /// the lock is released. `send` returns as soon as effects have been
        /// started; use the returned [`EffectHandle`] to wait for them.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::warn!("Rejecting action, store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            Ok(self.dispatch(action).await)
        }

        /// Reduce `action` and start its effects.
        ///
        /// Actions fed back by running effects come through here, so they
        /// still land while the store drains during shutdown.
        async fn dispatch(&self, action: A) -> EffectHandle {
            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            let (handle, tracking) = EffectHandle::new();
            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }
            handle
        }

        /// Read state through a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Stop accepting actions and wait for running effects to finish
        ///
        /// Actions produced by effects that are already running are still
        /// reduced.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
        /// still running when `timeout` elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            self.shutdown.store(true, Ordering::SeqCst);
            tracing::info!("Store shutdown initiated");

            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let pending = self.pending_effects.load(Ordering::SeqCst);
                if pending == 0 {
                    tracing::info!("Store shutdown complete");
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    tracing::warn!(pending, "Store shutdown timed out");
                    return Err(StoreError::ShutdownTimeout(pending));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        fn track(&self, tracking: &EffectTracking) -> (DecrementGuard, AtomicCounterGuard) {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            (
                DecrementGuard(tracking.clone()),
                AtomicCounterGuard(Arc::clone(&self.pending_effects)),
            )
        }

        /// Execute an effect, feeding a produced action back into the store
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guards = self.track(&tracking);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        if let Some(action) = fut.await {
                            // Hold the guards until the fed-back action's effects finish.
                            store.dispatch(action).await.wait().await;
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    });
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotpay_core::{SmallVec, smallvec};

    #[derive(Clone, Debug, PartialEq)]
    enum SlotAction {
        Hold,
        Held,
        HoldLater,
        Rehold,
    }

    #[derive(Default)]
    struct SlotState {
        held: bool,
        confirmations: u32,
    }

    struct SlotReducer;

    impl Reducer for SlotReducer {
        type State = SlotState;
        type Action = SlotAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut SlotState,
            action: SlotAction,
            _env: &(),
        ) -> SmallVec<[Effect<SlotAction>; 4]> {
            match action {
                SlotAction::Hold => {
                    smallvec![Effect::future(async { Some(SlotAction::Held) })]
                },
                SlotAction::Held => {
                    state.held = true;
                    state.confirmations += 1;
                    smallvec![Effect::None]
                },
                SlotAction::HoldLater => smallvec![Effect::future(async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Some(SlotAction::Held)
                })],
                SlotAction::Rehold => {
                    state.held = false;
                    smallvec![Effect::future(async { Some(SlotAction::HoldLater) })]
                },
            }
        }
    }

    #[tokio::test]
    async fn future_effect_feeds_action_back() {
        let store = Store::new(SlotState::default(), SlotReducer, ());

        let mut handle = store.send(SlotAction::Hold).await.unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        assert!(store.state(|s| s.held).await);
        assert_eq!(store.state(|s| s.confirmations).await, 1);
    }

    #[tokio::test]
    async fn handle_waits_for_chained_effects() {
        let store = Store::new(SlotState::default(), SlotReducer, ());

        let mut handle = store.send(SlotAction::Rehold).await.unwrap();
        assert!(!store.state(|s| s.held).await);

        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert!(store.state(|s| s.held).await);
    }

    #[tokio::test]
    async fn shutdown_drains_running_effects() {
        let store = Store::new(SlotState::default(), SlotReducer, ());
        let _handle = store.send(SlotAction::HoldLater).await.unwrap();

        store.shutdown(Duration::from_secs(1)).await.unwrap();

        assert!(store.state(|s| s.held).await);
        let result = store.send(SlotAction::Hold).await;
        assert_eq!(result.unwrap_err(), StoreError::ShutdownInProgress);
    }

    #[tokio::test]
    async fn shutdown_times_out_on_slow_effects() {
        let store = Store::new(SlotState::default(), SlotReducer, ());
        let _handle = store.send(SlotAction::HoldLater).await.unwrap();

        let result = store.shutdown(Duration::from_millis(1)).await;

        assert_eq!(result, Err(StoreError::ShutdownTimeout(1)));
    }

    #[tokio::test]
    async fn completed_handle_does_not_wait() {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        handle.wait_with_timeout(Duration::from_millis(50)).await.unwrap();
    }
}
