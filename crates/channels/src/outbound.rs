use {
    async_trait::async_trait,
    herald_common::{ChannelId, MessageId},
};

use crate::{Result, message::OutgoingMessage};

/// Send, edit and delete messages on a chat platform.
///
/// Implementations report a vanished message as [`crate::Error::NotFound`]
/// and a revoked permission as [`crate::Error::Forbidden`]; the engine relies
/// on that distinction for edit reconciliation and cascade deletion.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a new message and return its id.
    async fn send_message(&self, channel: ChannelId, message: &OutgoingMessage) -> Result<MessageId>;

    /// Replace the contents of a previously sent message.
    async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<()>;

    /// Delete several messages in one request.
    ///
    /// May fail as a whole when any single id cannot be deleted; callers fall
    /// back to [`Transport::delete_message`] per id.
    async fn delete_messages(&self, channel: ChannelId, message_ids: &[MessageId]) -> Result<()>;

    /// Delete one message.
    async fn delete_message(&self, channel: ChannelId, message_id: MessageId) -> Result<()>;
}
