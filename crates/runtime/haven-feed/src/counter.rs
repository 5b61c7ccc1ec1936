//! Optimistic counters (likes, reports)
//!
//! The caller gets `display + 1` back immediately and the atomic increment
//! runs in the background. If the increment fails the optimistic value is
//! kept: the displayed count may run ahead of the store until the next
//! reload shows the stored value.

use crate::{FeedError, Result};
use haven_core::SharedStore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// How repeated increments of the same counter are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CounterPolicy {
    /// Every call adds one, even while an earlier call is unsettled
    #[default]
    EveryCall,
    /// A repeat for the same item and counter is ignored until the
    /// previous increment settles
    SuppressInFlight,
}

type CounterKey = (String, String);

enum Dispatch {
    Sent(JoinHandle<Result<()>>),
    Suppressed,
    NoRuntime,
}

/// Result of [`CounterMutator::increment`]
pub struct PendingIncrement {
    display: u64,
    dispatch: Dispatch,
}

impl PendingIncrement {
    /// The value to show right away
    pub fn display(&self) -> u64 {
        self.display
    }

    /// True when the policy swallowed this call and nothing was sent
    pub fn was_suppressed(&self) -> bool {
        matches!(self.dispatch, Dispatch::Suppressed)
    }

    /// Wait for the store's answer.
    ///
    /// Dropping a `PendingIncrement` instead lets the increment finish on its own.
    pub async fn settled(self) -> Result<()> {
        match self.dispatch {
            Dispatch::Sent(handle) => handle
                .await
                .map_err(|e| FeedError::Dispatch(e.to_string()))?,
            Dispatch::Suppressed => Ok(()),
            Dispatch::NoRuntime => Err(FeedError::Dispatch("no async runtime".into())),
        }
    }
}

/// Applies named counter increments to items of one collection
pub struct CounterMutator {
    store: SharedStore,
    collection: String,
    policy: CounterPolicy,
    in_flight: Arc<Mutex<HashSet<CounterKey>>>,
}

impl CounterMutator {
    pub fn new(store: SharedStore, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            policy: CounterPolicy::default(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_policy(mut self, policy: CounterPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CounterPolicy {
        self.policy
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Number of increments sent and not yet settled (tracked under `SuppressInFlight` only)
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Add one to `counter` on `item_id`.
    ///
    /// Returns at once with `local_display + 1` (or `local_display` if the
    /// policy suppressed the call). The store update is spawned on the
    /// current Tokio runtime.
    pub fn increment(&self, item_id: &str, counter: &str, local_display: u64) -> PendingIncrement {
        let key = (item_id.to_string(), counter.to_string());
        let track = self.policy == CounterPolicy::SuppressInFlight;

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No runtime to send {} increment for {}", counter, item_id);
            return PendingIncrement {
                display: local_display.saturating_add(1),
                dispatch: Dispatch::NoRuntime,
            };
        };

        if track {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(key.clone()) {
                tracing::debug!("Suppressed repeat {} on {}", counter, item_id);
                return PendingIncrement {
                    display: local_display,
                    dispatch: Dispatch::Suppressed,
                };
            }
        }

        let store = self.store.clone();
        let collection = self.collection.clone();
        let in_flight = self.in_flight.clone();

        let handle = runtime.spawn(async move {
            let (item_id, counter) = &key;
            let outcome = store.increment(&collection, item_id, counter, 1).await;

            if track {
                in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
            }

            outcome.map_err(|e| {
                tracing::warn!(
                    "Increment of {} on {}/{} failed, keeping optimistic count: {}",
                    counter,
                    collection,
                    item_id,
                    e
                );
                FeedError::Mutation(e)
            })
        });

        PendingIncrement {
            display: local_display.saturating_add(1),
            dispatch: Dispatch::Sent(handle),
        }
    }
}
