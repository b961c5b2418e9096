//! In-memory delivery store. Records are lost on restart.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use {async_trait::async_trait, herald_common::MessageId, tokio::time::Instant};

use crate::{
    Result,
    config::EngineConfig,
    delivery::{DEFAULT_RECORD_TTL, DeliveryStore},
};

struct Record {
    messages: Vec<MessageId>,
    expires_at: Instant,
}

/// Delivery store backed by a `HashMap`, expiring records lazily on access.
pub struct InMemoryDeliveryStore {
    ttl: Duration,
    records: Mutex<HashMap<MessageId, Record>>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_RECORD_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Store whose records live for `delivery_ttl_secs` from the engine config.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_ttl(config.delivery_ttl())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.retain(|_, r| r.expires_at > now);
        records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to the live record of `trigger`, dropping it first if it
    /// has expired.
    fn with_live<T>(&self, trigger: MessageId, f: impl FnOnce(Option<&mut Record>) -> T) -> T {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.get(&trigger).is_some_and(|r| r.expires_at <= now) {
            records.remove(&trigger);
        }
        f(records.get_mut(&trigger))
    }
}

impl Default for InMemoryDeliveryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn record_new(&self, trigger: MessageId, message: MessageId) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(trigger, Record {
            messages: vec![message],
            expires_at: Instant::now() + self.ttl,
        });
        Ok(())
    }

    async fn record_append(&self, trigger: MessageId, message: MessageId) -> Result<()> {
        let expires_at = Instant::now() + self.ttl;
        let appended = self.with_live(trigger, |record| match record {
            Some(record) => {
                record.messages.push(message);
                record.expires_at = expires_at;
                true
            },
            None => false,
        });
        if !appended {
            self.record_new(trigger, message).await?;
        }
        Ok(())
    }

    async fn lookup(&self, trigger: MessageId) -> Result<Vec<MessageId>> {
        Ok(self.with_live(trigger, |record| {
            record.map(|r| r.messages.clone()).unwrap_or_default()
        }))
    }

    async fn drop_oldest(&self, trigger: MessageId) -> Result<Option<MessageId>> {
        let expires_at = Instant::now() + self.ttl;
        Ok(self.with_live(trigger, |record| {
            let record = record?;
            if record.messages.is_empty() {
                return None;
            }
            record.expires_at = expires_at;
            Some(record.messages.remove(0))
        }))
    }

    async fn remove(&self, trigger: MessageId, message: MessageId) -> Result<bool> {
        let expires_at = Instant::now() + self.ttl;
        Ok(self.with_live(trigger, |record| {
            let Some(record) = record else {
                return false;
            };
            let before = record.messages.len();
            record.messages.retain(|m| *m != message);
            record.expires_at = expires_at;
            record.messages.len() != before
        }))
    }

    async fn clear(&self, trigger: MessageId) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.remove(&trigger);
        Ok(())
    }
}
