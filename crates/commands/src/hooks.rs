//! After-invoke hooks, run from the invocation's cleanup path.

use std::{cmp::Reverse, sync::Arc};

use {async_trait::async_trait, tracing::warn};

use crate::{error::DispatchError, invocation::Invocation};

/// Runs after every admitted invocation, whatever its outcome.
#[async_trait]
pub trait AfterInvokeHook: Send + Sync {
    fn name(&self) -> &str;

    /// Higher values run first. Default is 0.
    fn priority(&self) -> i32 {
        0
    }

    /// `error` is `None` for a completed invocation.
    async fn after_invoke(
        &self,
        invocation: &Invocation,
        error: Option<&DispatchError>,
    ) -> anyhow::Result<()>;
}

/// Hooks ordered by descending priority, ties kept in registration order.
#[derive(Clone, Default)]
pub struct HookSet {
    hooks: Vec<Arc<dyn AfterInvokeHook>>,
}

impl HookSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn AfterInvokeHook>) {
        self.hooks.push(hook);
        self.hooks.sort_by_key(|h| Reverse(h.priority()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|h| h.name())
    }

    /// Run every hook in order. Failures are logged and never stop later
    /// hooks.
    pub async fn run(&self, invocation: &Invocation, error: Option<&DispatchError>) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_invoke(invocation, error).await {
                warn!(
                    hook = hook.name(),
                    command = invocation.command(),
                    invocation_id = %invocation.id,
                    error = %e,
                    "after-invoke hook failed"
                );
            }
        }
    }
}
