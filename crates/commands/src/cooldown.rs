//! Per-key fixed-window rate limiting.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    tokio::time::Instant,
};

use crate::bucket::{BucketKey, BucketType};

const SWEEP_EVERY_UPDATES: u64 = 512;

/// `rate` invocations per `per` window, grouped by `bucket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    pub rate: u32,
    pub per: Duration,
    pub bucket: BucketType,
}

impl Cooldown {
    #[must_use]
    pub fn new(rate: u32, per: Duration, bucket: BucketType) -> Self {
        Self { rate, per, bucket }
    }
}

impl fmt::Display for Cooldown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} time(s) per {} second(s)",
            self.rate,
            self.per.as_secs_f64()
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    used: u32,
}

/// Shared cooldown state of one command.
#[derive(Debug)]
pub struct CooldownMapping {
    cooldown: Cooldown,
    windows: DashMap<BucketKey, Window>,
    updates_seen: AtomicU64,
}

impl CooldownMapping {
    #[must_use]
    pub fn new(cooldown: Cooldown) -> Self {
        Self {
            cooldown,
            windows: DashMap::new(),
            updates_seen: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn cooldown(&self) -> Cooldown {
        self.cooldown
    }

    /// Consume a token for `key`, or report how long until one is available.
    pub fn update_rate_limit(&self, key: BucketKey) -> Result<(), Duration> {
        self.update_rate_limit_at(key, Instant::now())
    }

    pub fn update_rate_limit_at(&self, key: BucketKey, now: Instant) -> Result<(), Duration> {
        let Cooldown { rate, per, .. } = self.cooldown;
        if rate == 0 {
            return Err(per);
        }

        let decision = match self.windows.entry(key) {
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                let elapsed = now.saturating_duration_since(window.started_at);
                // A fully elapsed window always restarts with a full token
                // count, however many attempts were denied meanwhile.
                if elapsed >= per {
                    window.started_at = now;
                    window.used = 1;
                    Ok(())
                } else if window.used < rate {
                    window.used += 1;
                    Ok(())
                } else {
                    Err(per.saturating_sub(elapsed))
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Window {
                    started_at: now,
                    used: 1,
                });
                Ok(())
            },
        };

        self.sweep_if_needed(now);
        decision
    }

    /// Forget the window of `key`; its next attempt starts fresh.
    pub fn reset(&self, key: &BucketKey) {
        self.windows.remove(key);
    }

    /// Tokens left for `key` at `now` without consuming one.
    #[must_use]
    pub fn remaining_at(&self, key: &BucketKey, now: Instant) -> u32 {
        match self.windows.get(key) {
            Some(window) if now.saturating_duration_since(window.started_at) < self.cooldown.per => {
                self.cooldown.rate.saturating_sub(window.used)
            },
            _ => self.cooldown.rate,
        }
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn sweep_if_needed(&self, now: Instant) {
        let seen = self.updates_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(SWEEP_EVERY_UPDATES) {
            return;
        }
        let stale_after = self.cooldown.per.saturating_mul(3);
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.started_at) <= stale_after);
    }
}
