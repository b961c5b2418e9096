//! Permission predicates evaluated before admission.

use std::sync::Arc;

use herald_channels::{PermissionSet, PermissionSource};

use crate::{
    context::InvocationContext,
    error::{DispatchError, PermissionScope},
};

/// A failed predicate: who is missing what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denied {
    pub scope: PermissionScope,
    pub missing: PermissionSet,
}

impl From<Denied> for DispatchError {
    fn from(denied: Denied) -> Self {
        Self::PermissionDenied {
            scope: denied.scope,
            missing: denied.missing,
        }
    }
}

/// Pure predicate over an invocation. Must not mutate shared state.
pub trait Check: Send + Sync {
    fn check(&self, ctx: &InvocationContext, permissions: &dyn PermissionSource)
    -> Result<(), Denied>;
}

impl<F> Check for F
where
    F: Fn(&InvocationContext, &dyn PermissionSource) -> Result<(), Denied> + Send + Sync,
{
    fn check(
        &self,
        ctx: &InvocationContext,
        permissions: &dyn PermissionSource,
    ) -> Result<(), Denied> {
        self(ctx, permissions)
    }
}

/// Requires a permission set from the invoking user or from the bot in the
/// invocation's channel.
#[derive(Debug, Clone)]
pub struct RequirePermissions {
    pub scope: PermissionScope,
    pub required: PermissionSet,
}

impl RequirePermissions {
    #[must_use]
    pub fn user(required: impl Into<PermissionSet>) -> Self {
        Self {
            scope: PermissionScope::User,
            required: required.into(),
        }
    }

    #[must_use]
    pub fn bot(required: impl Into<PermissionSet>) -> Self {
        Self {
            scope: PermissionScope::Bot,
            required: required.into(),
        }
    }
}

impl Check for RequirePermissions {
    fn check(
        &self,
        ctx: &InvocationContext,
        permissions: &dyn PermissionSource,
    ) -> Result<(), Denied> {
        if self.required.is_empty() {
            return Ok(());
        }
        let granted = match self.scope {
            PermissionScope::User => {
                permissions.user_permissions(ctx.guild(), ctx.channel(), ctx.author())
            },
            PermissionScope::Bot => permissions.bot_permissions(ctx.guild(), ctx.channel()),
        };
        let missing = granted.missing(&self.required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Denied {
                scope: self.scope,
                missing,
            })
        }
    }
}

/// Run `checks` in order, stopping at the first denial.
pub fn run_checks(
    checks: &[Arc<dyn Check>],
    ctx: &InvocationContext,
    permissions: &dyn PermissionSource,
) -> Result<(), Denied> {
    checks
        .iter()
        .try_for_each(|check| check.check(ctx, permissions))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::context::Trigger,
        herald_channels::{Permission, StaticPermissions},
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn ctx() -> InvocationContext {
        InvocationContext {
            trigger: Trigger::new(1, 2, 3, "!cmd"),
            command: "cmd".into(),
            invoked_with: "cmd".into(),
            args: String::new(),
        }
    }

    #[test]
    fn bot_denial_lists_missing() {
        let perms = StaticPermissions {
            user: PermissionSet::all(),
            bot: [Permission::SendMessages].into(),
        };
        let check = RequirePermissions::bot([
            Permission::SendMessages,
            Permission::AttachFiles,
            Permission::EmbedLinks,
        ]);
        let denied = check.check(&ctx(), &perms).unwrap_err();
        assert_eq!(denied.scope, PermissionScope::Bot);
        assert_eq!(denied.missing.to_string(), "embed_links, attach_files");
    }

    #[test]
    fn stops_at_first_denial() {
        let perms = StaticPermissions {
            user: PermissionSet::new(),
            bot: PermissionSet::new(),
        };
        let later_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later_calls);
        let checks: Vec<Arc<dyn Check>> = vec![
            Arc::new(RequirePermissions::bot([Permission::EmbedLinks])),
            Arc::new(RequirePermissions::user([Permission::SendMessages])),
            Arc::new(move |_: &InvocationContext, _: &dyn PermissionSource| -> Result<(), Denied> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];

        let denied = run_checks(&checks, &ctx(), &perms).unwrap_err();
        assert_eq!(denied.scope, PermissionScope::Bot);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn all_pass() {
        let checks: Vec<Arc<dyn Check>> = vec![
            Arc::new(RequirePermissions::bot([Permission::EmbedLinks])),
            Arc::new(RequirePermissions::user([Permission::SendMessages])),
        ];
        assert!(run_checks(&checks, &ctx(), &StaticPermissions::allow_all()).is_ok());
    }
}
