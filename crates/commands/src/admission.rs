//! Admission control: cooldown first, then the concurrency gate.

use crate::{
    concurrency::{ConcurrencyGate, ConcurrencyPermit, MaxConcurrency},
    context::Trigger,
    cooldown::{Cooldown, CooldownMapping},
    error::Rejection,
};

/// Bucket and gate state shared by all invocations of one command.
#[derive(Debug)]
pub struct Admission {
    cooldown: Option<CooldownMapping>,
    gate: Option<ConcurrencyGate>,
}

/// Proof of admission. Holds the concurrency slot until dropped.
#[derive(Debug)]
#[must_use = "dropping the permit releases the concurrency slot"]
pub struct AdmissionPermit {
    _slot: Option<ConcurrencyPermit>,
}

impl Admission {
    #[must_use]
    pub fn new(cooldown: Option<Cooldown>, concurrency: Option<MaxConcurrency>) -> Self {
        Self {
            cooldown: cooldown.map(CooldownMapping::new),
            gate: concurrency.map(ConcurrencyGate::new),
        }
    }

    #[must_use]
    pub fn cooldown(&self) -> Option<&CooldownMapping> {
        self.cooldown.as_ref()
    }

    #[must_use]
    pub fn gate(&self) -> Option<&ConcurrencyGate> {
        self.gate.as_ref()
    }

    /// Admit `trigger` or say why not. Never suspends.
    ///
    /// A waiting gate at capacity is reported as a rejection here; use
    /// [`Admission::acquire`] to queue instead.
    pub fn try_acquire(&self, trigger: &Trigger) -> Result<AdmissionPermit, Rejection> {
        self.check_cooldown(trigger)?;
        let Some(gate) = &self.gate else {
            return Ok(AdmissionPermit { _slot: None });
        };
        let limit = gate.limit();
        gate.try_acquire(&limit.bucket.key(trigger))
            .map(|slot| AdmissionPermit { _slot: Some(slot) })
            .ok_or(Rejection::ConcurrencyLimit {
                limit: limit.max,
                bucket: limit.bucket,
            })
    }

    /// Like [`Admission::try_acquire`], but a gate configured with `wait`
    /// queues until a slot frees up.
    pub async fn acquire(&self, trigger: &Trigger) -> Result<AdmissionPermit, Rejection> {
        match &self.gate {
            Some(gate) if gate.limit().wait => {
                self.check_cooldown(trigger)?;
                let key = gate.limit().bucket.key(trigger);
                let slot = gate.acquire(&key).await;
                Ok(AdmissionPermit { _slot: Some(slot) })
            },
            _ => self.try_acquire(trigger),
        }
    }

    fn check_cooldown(&self, trigger: &Trigger) -> Result<(), Rejection> {
        match &self.cooldown {
            Some(mapping) => mapping
                .update_rate_limit(mapping.cooldown().bucket.key(trigger))
                .map_err(|retry_after| Rejection::Cooldown { retry_after }),
            None => Ok(()),
        }
    }
}
