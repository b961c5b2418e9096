//! Persistence trait for delivery records.

use std::time::Duration;

use {async_trait::async_trait, herald_common::MessageId};

use crate::Result;

/// How long a record survives without being written to.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Maps a trigger message to the ordered list of messages the engine sent
/// in response.
///
/// Every write refreshes the record's TTL. An expired record is
/// indistinguishable from a missing one.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Start a record for `trigger` holding only `message`, replacing any
    /// previous one.
    async fn record_new(&self, trigger: MessageId, message: MessageId) -> Result<()>;

    /// Append `message` to the record of `trigger`, creating it if needed.
    async fn record_append(&self, trigger: MessageId, message: MessageId) -> Result<()>;

    /// Recorded messages in send order. Empty when there is no record.
    async fn lookup(&self, trigger: MessageId) -> Result<Vec<MessageId>>;

    /// Remove and return the first recorded message.
    async fn drop_oldest(&self, trigger: MessageId) -> Result<Option<MessageId>>;

    /// Remove one message from the record. Returns whether it was present.
    async fn remove(&self, trigger: MessageId, message: MessageId) -> Result<bool>;

    /// Forget the record of `trigger`.
    async fn clear(&self, trigger: MessageId) -> Result<()>;
}
