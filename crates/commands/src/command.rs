//! Static command descriptors and their builder.

use std::{fmt, future::Future, sync::Arc};

use futures::{
    FutureExt, Stream, StreamExt, TryFutureExt, TryStreamExt,
    future::BoxFuture,
    stream::BoxStream,
};

use crate::{
    admission::Admission,
    checks::Check,
    concurrency::MaxConcurrency,
    context::InvocationContext,
    cooldown::Cooldown,
    hooks::{AfterInvokeHook, HookSet},
    output::Output,
};

type SingleFn = dyn Fn(InvocationContext) -> BoxFuture<'static, anyhow::Result<Output>> + Send + Sync;
type StreamFn =
    dyn Fn(InvocationContext) -> BoxStream<'static, anyhow::Result<Output>> + Send + Sync;

/// The body of a command: one result, or a finite stream of results that
/// are delivered as they are produced.
#[derive(Clone)]
pub enum Handler {
    Single(Arc<SingleFn>),
    Stream(Arc<StreamFn>),
}

impl Handler {
    pub fn single<F, Fut, O>(f: F) -> Self
    where
        F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<Output> + 'static,
    {
        Self::Single(Arc::new(move |ctx| f(ctx).map_ok(Into::<Output>::into).boxed()))
    }

    pub fn stream<F, S, O>(f: F) -> Self
    where
        F: Fn(InvocationContext) -> S + Send + Sync + 'static,
        S: Stream<Item = anyhow::Result<O>> + Send + 'static,
        O: Into<Output> + 'static,
    {
        Self::Stream(Arc::new(move |ctx| f(ctx).map_ok(Into::<Output>::into).boxed()))
    }

    /// Run the handler as a stream; a single handler yields exactly once.
    pub(crate) fn invoke(&self, ctx: InvocationContext) -> BoxStream<'static, anyhow::Result<Output>> {
        match self {
            Self::Single(f) => f(ctx).into_stream().boxed(),
            Self::Stream(f) => f(ctx),
        }
    }

    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(_) => f.write_str("Handler::Single"),
            Self::Stream(_) => f.write_str("Handler::Stream"),
        }
    }
}

/// Whether a policy was set explicitly, left to the registry default, or
/// turned off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy<T> {
    #[default]
    Default,
    Custom(T),
    Disabled,
}

impl<T: Copy> Policy<T> {
    pub(crate) fn resolve(self, default: Option<T>) -> Option<T> {
        match self {
            Self::Default => default,
            Self::Custom(value) => Some(value),
            Self::Disabled => None,
        }
    }
}

/// A registered command. Immutable apart from its admission state.
pub struct Command {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) description: Option<String>,
    pub(crate) handler: Handler,
    pub(crate) checks: Vec<Arc<dyn Check>>,
    pub(crate) hooks: HookSet,
    pub(crate) admission: Admission,
}

impl Command {
    /// Start describing a command.
    pub fn builder(name: impl Into<String>, handler: Handler) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            aliases: Vec::new(),
            description: None,
            handler,
            cooldown: Policy::Default,
            concurrency: Policy::Default,
            checks: Vec::new(),
            hooks: HookSet::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    #[must_use]
    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    #[must_use]
    pub fn checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    #[must_use]
    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("handler", &self.handler)
            .field("checks", &self.checks.len())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

/// Declarative description of a command, finalized by
/// [`crate::CommandRegistry::register`].
pub struct CommandBuilder {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) description: Option<String>,
    pub(crate) handler: Handler,
    pub(crate) cooldown: Policy<Cooldown>,
    pub(crate) concurrency: Policy<MaxConcurrency>,
    pub(crate) checks: Vec<Arc<dyn Check>>,
    pub(crate) hooks: HookSet,
}

impl CommandBuilder {
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn cooldown(mut self, cooldown: Cooldown) -> Self {
        self.cooldown = Policy::Custom(cooldown);
        self
    }

    #[must_use]
    pub fn no_cooldown(mut self) -> Self {
        self.cooldown = Policy::Disabled;
        self
    }

    #[must_use]
    pub fn max_concurrency(mut self, limit: MaxConcurrency) -> Self {
        self.concurrency = Policy::Custom(limit);
        self
    }

    #[must_use]
    pub fn no_concurrency_limit(mut self) -> Self {
        self.concurrency = Policy::Disabled;
        self
    }

    /// Add a predicate. Predicates run in the order they were added, before
    /// the registry-wide permission checks.
    #[must_use]
    pub fn check(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Add a hook that runs before the global after-invoke hooks.
    #[must_use]
    pub fn after_invoke(mut self, hook: Arc<dyn AfterInvokeHook>) -> Self {
        self.hooks.register(hook);
        self
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{context::Trigger, output::OutputPart},
    };

    fn ctx() -> InvocationContext {
        InvocationContext {
            trigger: Trigger::new(1, 2, 3, "!x a b"),
            command: "x".into(),
            invoked_with: "x".into(),
            args: "a b".into(),
        }
    }

    #[tokio::test]
    async fn single_handler_yields_once() {
        let handler = Handler::single(|ctx: InvocationContext| async move {
            anyhow::Ok(format!("args: {}", ctx.args))
        });
        let outputs: Vec<_> = handler.invoke(ctx()).collect().await;
        assert_eq!(outputs.len(), 1);
        assert_eq!(
            outputs[0].as_ref().unwrap().parts(),
            &[OutputPart::Text("args: a b".into())]
        );
    }

    #[tokio::test]
    async fn stream_handler_yields_in_order() {
        let handler = Handler::stream(|ctx: InvocationContext| {
            let words: Vec<String> = ctx.arg_list().map(str::to_string).collect();
            futures::stream::iter(words.into_iter().map(anyhow::Ok))
        });
        assert!(handler.is_stream());
        let outputs: Vec<Output> = handler.invoke(ctx()).try_collect().await.unwrap();
        assert_eq!(outputs, vec![Output::from("a"), Output::from("b")]);
    }

    #[test]
    fn policy_resolution() {
        assert_eq!(Policy::<u8>::Default.resolve(Some(1)), Some(1));
        assert_eq!(Policy::Custom(2).resolve(Some(1)), Some(2));
        assert_eq!(Policy::<u8>::Disabled.resolve(Some(1)), None);
    }
}
