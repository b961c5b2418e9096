//! Removing bot replies when their trigger goes away or the owner asks.

use {
    herald_common::{ChannelId, MessageId, UserId},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, delivery as delivery_metrics};

use crate::dispatcher::Dispatcher;

/// Most ids a single bulk delete request may carry.
pub const BULK_DELETE_LIMIT: usize = 100;

/// What a cascade deletion achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub deleted: usize,
    /// Already deleted by someone else.
    pub already_gone: usize,
    /// Could not be deleted; logged, never surfaced.
    pub failed: usize,
}

/// Someone pressed the delete affordance on a bot message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteButtonPress {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    /// Owner recorded on the affordance.
    pub owner: UserId,
    pub presser: UserId,
    /// Trigger the message answered, when the transport knows it.
    pub trigger_id: Option<MessageId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePress {
    Deleted,
    AlreadyGone,
    /// The presser does not own the affordance; nothing was deleted.
    NotOwner,
}

impl Dispatcher {
    /// The trigger was deleted: cancel its invocations, wait for any delivery
    /// already under way, and delete every message recorded for it.
    pub async fn on_trigger_deleted(&self, channel: ChannelId, trigger: MessageId) -> CascadeOutcome {
        self.on_triggers_deleted(channel, &[trigger]).await
    }

    /// Bulk variant of [`Dispatcher::on_trigger_deleted`]. Deletion errors are
    /// swallowed; the records are cleared either way.
    pub async fn on_triggers_deleted(
        &self,
        channel: ChannelId,
        triggers: &[MessageId],
    ) -> CascadeOutcome {
        let mut targets = Vec::new();
        for &trigger in triggers {
            if self.cancel_and_drain(trigger).await {
                debug!(trigger_id = %trigger, "trigger deleted, cancelled in-flight invocation");
            }
            match self.store().lookup(trigger).await {
                Ok(ids) => targets.extend(ids),
                Err(e) => warn!(trigger_id = %trigger, error = %e, "delivery record lookup failed"),
            }
        }

        let mut outcome = CascadeOutcome::default();
        for chunk in targets.chunks(BULK_DELETE_LIMIT) {
            if let [single] = chunk {
                self.delete_one(channel, *single, &mut outcome).await;
                continue;
            }
            match self.transport().delete_messages(channel, chunk).await {
                Ok(()) => outcome.deleted += chunk.len(),
                Err(e) => {
                    debug!(count = chunk.len(), error = %e, "bulk delete failed, deleting one by one");
                    for &id in chunk {
                        self.delete_one(channel, id, &mut outcome).await;
                    }
                },
            }
        }

        for &trigger in triggers {
            if let Err(e) = self.store().clear(trigger).await {
                warn!(trigger_id = %trigger, error = %e, "failed to clear delivery record");
            }
        }

        #[cfg(feature = "metrics")]
        counter!(delivery_metrics::MESSAGES_DELETED_TOTAL).increment(outcome.deleted as u64);
        debug!(
            deleted = outcome.deleted,
            already_gone = outcome.already_gone,
            failed = outcome.failed,
            "cascade delete finished"
        );
        outcome
    }

    async fn delete_one(&self, channel: ChannelId, id: MessageId, outcome: &mut CascadeOutcome) {
        match self.transport().delete_message(channel, id).await {
            Ok(()) => outcome.deleted += 1,
            Err(e) if e.is_not_found() => outcome.already_gone += 1,
            Err(e) => {
                warn!(message_id = %id, error = %e, "failed to delete message");
                outcome.failed += 1;
            },
        }
    }

    /// Delete the pressed message if the presser owns the affordance.
    pub async fn on_delete_pressed(
        &self,
        press: DeleteButtonPress,
    ) -> herald_channels::Result<DeletePress> {
        if press.presser != press.owner {
            return Ok(DeletePress::NotOwner);
        }

        let result = match self
            .transport()
            .delete_message(press.channel_id, press.message_id)
            .await
        {
            Ok(()) => DeletePress::Deleted,
            Err(e) if e.is_not_found() => DeletePress::AlreadyGone,
            Err(e) => return Err(e),
        };

        if let Some(trigger) = press.trigger_id
            && let Err(e) = self.store().remove(trigger, press.message_id).await
        {
            warn!(trigger_id = %trigger, error = %e, "failed to update delivery record");
        }
        Ok(result)
    }
}
