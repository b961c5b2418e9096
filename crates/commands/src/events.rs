//! Outbound invocation events for usage accounting and error rendering.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    context::Trigger,
    error::DispatchError,
    invocation::{Invocation, InvocationReport},
};

/// Receives invocation events. All methods except the two required ones
/// default to no-ops.
#[async_trait]
pub trait CommandEventSink: Send + Sync {
    /// A trigger resolved to a command and is about to be checked.
    async fn command_invoked(&self, _invocation: &Invocation) {}

    /// The invocation ran to completion. Not dispatched for cancellations.
    async fn command_completion(&self, invocation: &Invocation, report: &InvocationReport);

    /// The invocation failed. Never dispatched for [`DispatchError::Cancelled`].
    async fn command_error(&self, invocation: &Invocation, error: &DispatchError);

    /// The trigger used the command prefix but named no registered command.
    async fn command_not_found(&self, _trigger: &Trigger, _name: &str) {}
}

/// Counts completed invocations per command.
#[derive(Debug, Default)]
pub struct UsageTracker {
    uses: Mutex<HashMap<String, u64>>,
}

impl UsageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn uses(&self, command: &str) -> u64 {
        self.uses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(command)
            .copied()
            .unwrap_or(0)
    }

    /// Commands sorted by descending use count, then name.
    #[must_use]
    pub fn top(&self, limit: usize) -> Vec<(String, u64)> {
        let uses = self.uses.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<(String, u64)> = uses.iter().map(|(k, v)| (k.clone(), *v)).collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        all.truncate(limit);
        all
    }
}

#[async_trait]
impl CommandEventSink for UsageTracker {
    async fn command_completion(&self, invocation: &Invocation, _report: &InvocationReport) {
        let mut uses = self.uses.lock().unwrap_or_else(|e| e.into_inner());
        *uses.entry(invocation.command().to_string()).or_default() += 1;
    }

    async fn command_error(&self, _invocation: &Invocation, _error: &DispatchError) {}
}
