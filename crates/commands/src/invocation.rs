//! Per-trigger invocation lifecycle.

use std::fmt;

use {
    herald_common::{MessageId, UserId},
    serde::Serialize,
    tokio::time::Instant,
    uuid::Uuid,
};

use crate::context::InvocationContext;

/// `Pending → Checked → Admitted → Running → {Completed | Failed | Cancelled}`.
///
/// Permission and admission failures jump straight from `Pending`/`Checked`
/// to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Pending,
    Checked,
    Admitted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl InvocationState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Pending, Checked | Failed)
                | (Checked, Admitted | Failed | Cancelled)
                | (Admitted, Running | Failed | Cancelled)
                | (Running, Completed | Failed | Cancelled)
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Checked => "checked",
            Self::Admitted => "admitted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One end-to-end attempt to run a command for a single trigger. Owned by
/// the dispatcher for its lifetime and never persisted.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: Uuid,
    pub context: InvocationContext,
    state: InvocationState,
    started_at: Instant,
}

impl Invocation {
    #[must_use]
    pub fn new(context: InvocationContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
            state: InvocationState::Pending,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.context.command
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.context.author()
    }

    #[must_use]
    pub fn trigger_id(&self) -> MessageId {
        self.context.trigger_id()
    }

    #[must_use]
    pub fn state(&self) -> InvocationState {
        self.state
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Move to `next`. Illegal transitions are ignored and logged; terminal
    /// states are final.
    pub(crate) fn advance(&mut self, next: InvocationState) {
        if self.state.can_advance_to(next) {
            self.state = next;
        } else {
            tracing::warn!(
                invocation_id = %self.id,
                from = %self.state,
                to = %next,
                "ignoring illegal invocation state transition"
            );
        }
    }
}

/// A message the invocation put on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivered {
    Sent(MessageId),
    Edited(MessageId),
}

impl Delivered {
    #[must_use]
    pub fn message_id(self) -> MessageId {
        match self {
            Self::Sent(id) | Self::Edited(id) => id,
        }
    }
}

/// Result of a completed invocation.
#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub invocation_id: Uuid,
    pub command: String,
    pub state: InvocationState,
    /// In the order the handler produced them.
    pub deliveries: Vec<Delivered>,
}
