//! Per-key caps on simultaneously running invocations.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    serde::{Deserialize, Serialize},
    tokio::sync::Notify,
};

use crate::bucket::{BucketKey, BucketType};

/// At most `max` invocations per `bucket` at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxConcurrency {
    pub max: usize,
    pub bucket: BucketType,
    /// Queue behind running invocations instead of rejecting at capacity.
    pub wait: bool,
}

impl MaxConcurrency {
    #[must_use]
    pub fn new(max: usize, bucket: BucketType) -> Self {
        Self {
            max,
            bucket,
            wait: false,
        }
    }

    #[must_use]
    pub fn waiting(mut self) -> Self {
        self.wait = true;
        self
    }
}

impl Default for MaxConcurrency {
    fn default() -> Self {
        Self::new(1, BucketType::User)
    }
}

#[derive(Debug, Default)]
struct GateState {
    in_flight: Mutex<HashMap<BucketKey, usize>>,
    released: Notify,
}

/// Shared concurrency state of one command.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    limit: MaxConcurrency,
    state: Arc<GateState>,
}

impl ConcurrencyGate {
    #[must_use]
    pub fn new(limit: MaxConcurrency) -> Self {
        Self {
            limit,
            state: Arc::new(GateState::default()),
        }
    }

    #[must_use]
    pub fn limit(&self) -> MaxConcurrency {
        self.limit
    }

    /// Take a slot for `key` if one is free. Never suspends.
    #[must_use]
    pub fn try_acquire(&self, key: &BucketKey) -> Option<ConcurrencyPermit> {
        let mut in_flight = self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let count = in_flight.entry(key.clone()).or_default();
        if *count >= self.limit.max {
            if *count == 0 {
                in_flight.remove(key);
            }
            return None;
        }
        *count += 1;
        Some(ConcurrencyPermit {
            state: Arc::clone(&self.state),
            key: key.clone(),
        })
    }

    /// Take a slot for `key`, waiting for a release when at capacity.
    pub async fn acquire(&self, key: &BucketKey) -> ConcurrencyPermit {
        loop {
            let released = self.state.released.notified();
            tokio::pin!(released);
            // Register before checking so a release between the check and the
            // await is not missed.
            released.as_mut().enable();
            if let Some(permit) = self.try_acquire(key) {
                return permit;
            }
            released.await;
        }
    }

    /// Invocations currently holding a slot for `key`.
    #[must_use]
    pub fn in_flight(&self, key: &BucketKey) -> usize {
        self.state
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Invocations holding a slot across all keys.
    #[must_use]
    pub fn total_in_flight(&self) -> usize {
        self.state
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}

/// A held concurrency slot. Dropping it releases the slot, exactly once.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct ConcurrencyPermit {
    state: Arc<GateState>,
    key: BucketKey,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        {
            let mut in_flight = self
                .state
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(count) = in_flight.get_mut(&self.key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    in_flight.remove(&self.key);
                }
            }
        }
        self.state.released.notify_waiters();
    }
}
