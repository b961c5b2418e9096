//! The invocation controller.
//!
//! One [`Dispatcher::dispatch`] call drives one trigger through
//! `Pending → Checked → Admitted → Running → {Completed | Failed | Cancelled}`:
//! permission checks, admission, handler execution with per-output
//! normalization and delivery, then a single cleanup block that releases the
//! concurrency slot, runs after-invoke hooks and reports the outcome.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    futures::StreamExt,
    herald_channels::{OutgoingMessage, PermissionSource, StaticPermissions, Transport},
    herald_common::MessageId,
    tokio_util::sync::CancellationToken,
    tracing::{Instrument, debug, info_span, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{
    commands as command_metrics, counter, delivery as delivery_metrics, gauge, histogram, labels,
};

use crate::{
    checks::run_checks,
    command::Command,
    context::{InvocationContext, Trigger},
    delivery::DeliveryStore,
    delivery_memory::InMemoryDeliveryStore,
    error::DispatchError,
    events::CommandEventSink,
    hooks::{AfterInvokeHook, HookSet},
    invocation::{Delivered, Invocation, InvocationReport, InvocationState},
    output::Normalizer,
    registry::{CommandRegistry, Resolution},
};

/// Serializes invocations of the same trigger and carries their cancellation.
struct Lane {
    serial: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    users: AtomicUsize,
}

/// Leaves a lane on drop, removing it once its last user is gone.
struct LaneGuard<'a> {
    lanes: &'a DashMap<MessageId, Arc<Lane>>,
    trigger: MessageId,
    lane: Arc<Lane>,
}

impl Drop for LaneGuard<'_> {
    fn drop(&mut self) {
        // Runs under the shard lock, so it cannot race `enter_lane`.
        self.lanes.remove_if(&self.trigger, |_, lane| {
            Arc::ptr_eq(lane, &self.lane) && lane.users.fetch_sub(1, Ordering::AcqRel) == 1
        });
    }
}

/// Armed while the handler runs. If the dispatch future is dropped before
/// [`DroppedRun::disarm`], the after-invoke hooks still run, on a spawned
/// task, with the invocation marked cancelled.
struct DroppedRun {
    armed: bool,
    invocation: Invocation,
    command_hooks: HookSet,
    global_hooks: HookSet,
}

impl DroppedRun {
    fn new(invocation: &Invocation, command_hooks: &HookSet, global_hooks: &HookSet) -> Self {
        Self {
            armed: true,
            invocation: invocation.clone(),
            command_hooks: command_hooks.clone(),
            global_hooks: global_hooks.clone(),
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DroppedRun {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        #[cfg(feature = "metrics")]
        gauge!(command_metrics::IN_FLIGHT).decrement(1.0);

        let mut invocation = self.invocation.clone();
        invocation.advance(InvocationState::Cancelled);
        let command_hooks = std::mem::take(&mut self.command_hooks);
        let global_hooks = std::mem::take(&mut self.global_hooks);
        if command_hooks.is_empty() && global_hooks.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(
                    command = invocation.command(),
                    invocation_id = %invocation.id,
                    "dispatch dropped mid-run, running after-invoke hooks in the background"
                );
                handle.spawn(async move {
                    let error = DispatchError::Cancelled;
                    command_hooks.run(&invocation, Some(&error)).await;
                    global_hooks.run(&invocation, Some(&error)).await;
                });
            },
            Err(_) => warn!(
                command = invocation.command(),
                "dispatch dropped outside a runtime, after-invoke hooks skipped"
            ),
        }
    }
}

pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    transport: Arc<dyn Transport>,
    permissions: Arc<dyn PermissionSource>,
    store: Arc<dyn DeliveryStore>,
    normalizer: Normalizer,
    sinks: Vec<Arc<dyn CommandEventSink>>,
    hooks: HookSet,
    shutdown: CancellationToken,
    lanes: DashMap<MessageId, Arc<Lane>>,
}

pub struct DispatcherBuilder {
    registry: Arc<CommandRegistry>,
    transport: Arc<dyn Transport>,
    permissions: Option<Arc<dyn PermissionSource>>,
    store: Option<Arc<dyn DeliveryStore>>,
    normalizer: Normalizer,
    sinks: Vec<Arc<dyn CommandEventSink>>,
    hooks: HookSet,
}

impl DispatcherBuilder {
    /// Defaults to granting every permission.
    #[must_use]
    pub fn permissions(mut self, permissions: Arc<dyn PermissionSource>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Defaults to an [`InMemoryDeliveryStore`].
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DeliveryStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Sinks receive events in the order they were added.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn CommandEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Global hook, run after the command's own hooks.
    #[must_use]
    pub fn after_invoke(mut self, hook: Arc<dyn AfterInvokeHook>) -> Self {
        self.hooks.register(hook);
        self
    }

    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            registry: self.registry,
            transport: self.transport,
            permissions: self
                .permissions
                .unwrap_or_else(|| Arc::new(StaticPermissions::allow_all())),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryDeliveryStore::new())),
            normalizer: self.normalizer,
            sinks: self.sinks,
            hooks: self.hooks,
            shutdown: CancellationToken::new(),
            lanes: DashMap::new(),
        }
    }
}

impl Dispatcher {
    pub fn builder(
        registry: impl Into<Arc<CommandRegistry>>,
        transport: Arc<dyn Transport>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            registry: registry.into(),
            transport,
            permissions: None,
            store: None,
            normalizer: Normalizer::default(),
            sinks: Vec::new(),
            hooks: HookSet::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn DeliveryStore {
        self.store.as_ref()
    }

    /// Run the command named by `trigger`, if any.
    ///
    /// Returns `Ok(None)` when the trigger is not a command invocation. Every
    /// error variant, [`DispatchError::Cancelled`] included, is returned only
    /// after the concurrency slot has been released.
    pub async fn dispatch(
        &self,
        trigger: Trigger,
    ) -> Result<Option<InvocationReport>, DispatchError> {
        let (command, invoked_with, args) = match self.registry.resolve(&trigger.content) {
            Resolution::NotCommand => return Ok(None),
            Resolution::Unknown { name } => {
                debug!(name = %name, trigger_id = %trigger.message_id, "unknown command");
                for sink in &self.sinks {
                    sink.command_not_found(&trigger, &name).await;
                }
                return Ok(None);
            },
            Resolution::Found {
                command,
                invoked_with,
                args,
            } => (command, invoked_with, args),
        };

        let invocation = Invocation::new(InvocationContext {
            trigger,
            command: command.name().to_string(),
            invoked_with,
            args,
        });
        let span = info_span!(
            "invocation",
            invocation_id = %invocation.id,
            command = command.name(),
            user_id = %invocation.user_id(),
            trigger_id = %invocation.trigger_id(),
        );
        self.run(&command, invocation).instrument(span).await.map(Some)
    }

    async fn run(
        &self,
        command: &Command,
        mut invocation: Invocation,
    ) -> Result<InvocationReport, DispatchError> {
        #[cfg(feature = "metrics")]
        counter!(command_metrics::INVOKED_TOTAL, labels::COMMAND => command.name().to_string())
            .increment(1);
        for sink in &self.sinks {
            sink.command_invoked(&invocation).await;
        }

        // Pending → Checked
        if let Err(denied) = run_checks(
            command.checks(),
            &invocation.context,
            self.permissions.as_ref(),
        ) {
            return Err(self.reject(&mut invocation, denied.into()).await);
        }
        invocation.advance(InvocationState::Checked);

        let lane = self.enter_lane(invocation.trigger_id());

        // Checked → Admitted
        let admitted = tokio::select! {
            biased;
            () = lane.lane.cancel.cancelled() => Err(DispatchError::Cancelled),
            result = command.admission().acquire(&invocation.context.trigger) => {
                result.map_err(DispatchError::from)
            },
        };
        let permit = match admitted {
            Ok(permit) => permit,
            Err(DispatchError::Cancelled) => {
                invocation.advance(InvocationState::Cancelled);
                debug!("cancelled while waiting for admission");
                return Err(DispatchError::Cancelled);
            },
            Err(e) => return Err(self.reject(&mut invocation, e).await),
        };
        invocation.advance(InvocationState::Admitted);
        #[cfg(feature = "metrics")]
        gauge!(command_metrics::IN_FLIGHT).increment(1.0);

        // Admitted → Running
        invocation.advance(InvocationState::Running);
        let mut dropped = DroppedRun::new(&invocation, command.hooks(), &self.hooks);
        let outcome = self.execute(command, &invocation.context, &lane.lane).await;
        dropped.disarm();

        // Cleanup: every exit from Admitted/Running passes through here once.
        drop(permit);
        drop(lane);
        #[cfg(feature = "metrics")]
        {
            gauge!(command_metrics::IN_FLIGHT).decrement(1.0);
            histogram!(command_metrics::DURATION_SECONDS, labels::COMMAND => command.name().to_string())
                .record(invocation.elapsed().as_secs_f64());
        }
        invocation.advance(match &outcome {
            Ok(_) => InvocationState::Completed,
            Err(DispatchError::Cancelled) => InvocationState::Cancelled,
            Err(_) => InvocationState::Failed,
        });
        let error = outcome.as_ref().err();
        command.hooks().run(&invocation, error).await;
        self.hooks.run(&invocation, error).await;

        match outcome {
            Ok(deliveries) => {
                let report = InvocationReport {
                    invocation_id: invocation.id,
                    command: command.name().to_string(),
                    state: invocation.state(),
                    deliveries,
                };
                debug!(deliveries = report.deliveries.len(), "command completed");
                #[cfg(feature = "metrics")]
                counter!(command_metrics::COMPLETED_TOTAL, labels::COMMAND => command.name().to_string())
                    .increment(1);
                for sink in &self.sinks {
                    sink.command_completion(&invocation, &report).await;
                }
                Ok(report)
            },
            Err(DispatchError::Cancelled) => {
                debug!("command cancelled");
                #[cfg(feature = "metrics")]
                counter!(command_metrics::CANCELLED_TOTAL, labels::COMMAND => command.name().to_string())
                    .increment(1);
                Err(DispatchError::Cancelled)
            },
            Err(e) => {
                warn!(error = %e, "command failed");
                #[cfg(feature = "metrics")]
                counter!(
                    command_metrics::FAILED_TOTAL,
                    labels::COMMAND => command.name().to_string(),
                    labels::KIND => e.kind()
                )
                .increment(1);
                self.emit_error(&invocation, &e).await;
                Err(e)
            },
        }
    }

    /// Fail an invocation that never reached the handler.
    async fn reject(&self, invocation: &mut Invocation, error: DispatchError) -> DispatchError {
        invocation.advance(InvocationState::Failed);
        debug!(error = %error, kind = error.kind(), "invocation rejected");
        #[cfg(feature = "metrics")]
        {
            let kind = match &error {
                DispatchError::AdmissionRejected(rejection) => rejection.kind(),
                other => other.kind(),
            };
            counter!(
                command_metrics::REJECTED_TOTAL,
                labels::COMMAND => invocation.command().to_string(),
                labels::KIND => kind
            )
            .increment(1);
        }
        self.emit_error(invocation, &error).await;
        error
    }

    async fn emit_error(&self, invocation: &Invocation, error: &DispatchError) {
        for sink in &self.sinks {
            sink.command_error(invocation, error).await;
        }
    }

    /// Run the handler and deliver each output in production order.
    ///
    /// Cancellation is observed while waiting for the lane, the handler or
    /// normalization. A delivery already under way finishes and is recorded,
    /// so a cascade deletion that drains the lane afterwards sees it.
    async fn execute(
        &self,
        command: &Command,
        ctx: &InvocationContext,
        lane: &Lane,
    ) -> Result<Vec<Delivered>, DispatchError> {
        let _serial = tokio::select! {
            biased;
            () = lane.cancel.cancelled() => return Err(DispatchError::Cancelled),
            guard = lane.serial.lock() => guard,
        };
        let failed = |e: anyhow::Error| DispatchError::execution(&ctx.command, e);

        let mut outputs = command.handler().invoke(ctx.clone());
        let mut deliveries = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                () = lane.cancel.cancelled() => return Err(DispatchError::Cancelled),
                next = outputs.next() => next,
            };
            let Some(output) = next else {
                break;
            };
            let output = output.map_err(failed)?;
            let message = tokio::select! {
                biased;
                () = lane.cancel.cancelled() => return Err(DispatchError::Cancelled),
                message = self.normalizer.normalize(output, &ctx.trigger) => {
                    message.map_err(|e| failed(e.into()))?
                },
            };
            let Some(message) = message else {
                continue;
            };
            let delivered = self
                .deliver(&ctx.trigger, &message, deliveries.is_empty())
                .await
                .map_err(|e| failed(e.into()))?;
            deliveries.push(delivered);
        }
        Ok(deliveries)
    }

    /// Send `message`, or edit the previous reply when an edited trigger's
    /// first output can replace it.
    ///
    /// An edited trigger whose record holds exactly one message gets that
    /// message edited in place, unless the output carries an attachment.
    /// Everything else is sent and appended to the record.
    async fn deliver(
        &self,
        trigger: &Trigger,
        message: &OutgoingMessage,
        first: bool,
    ) -> herald_channels::Result<Delivered> {
        let channel = trigger.channel_id;

        if first && trigger.edited {
            let record = self
                .store
                .lookup(trigger.message_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "delivery record lookup failed, treating as empty");
                    Vec::new()
                });
            if let [previous] = record.as_slice()
                && message.attachment.is_none()
            {
                match self
                    .transport
                    .edit_message(channel, *previous, message)
                    .await
                {
                    Ok(()) => {
                        #[cfg(feature = "metrics")]
                        counter!(delivery_metrics::MESSAGES_EDITED_TOTAL).increment(1);
                        self.touch_record(trigger.message_id, *previous).await;
                        return Ok(Delivered::Edited(*previous));
                    },
                    Err(e) if e.is_gone_or_forbidden() => {
                        debug!(message_id = %previous, error = %e, "previous reply unavailable, sending a new one");
                        if let Err(e) = self.store.drop_oldest(trigger.message_id).await {
                            warn!(error = %e, "failed to drop stale delivery record entry");
                        }
                    },
                    Err(e) => return Err(e),
                }
            }
        }

        let sent = self.transport.send_message(channel, message).await?;
        #[cfg(feature = "metrics")]
        counter!(delivery_metrics::MESSAGES_SENT_TOTAL).increment(1);

        let recorded = if first && !trigger.edited {
            self.store.record_new(trigger.message_id, sent).await
        } else {
            self.store.record_append(trigger.message_id, sent).await
        };
        if let Err(e) = recorded {
            warn!(message_id = %sent, error = %e, "failed to record delivered message");
        }
        Ok(Delivered::Sent(sent))
    }

    /// Re-record an edited reply so its TTL restarts.
    async fn touch_record(&self, trigger: MessageId, message: MessageId) {
        if let Err(e) = self.store.record_new(trigger, message).await {
            warn!(message_id = %message, error = %e, "failed to refresh delivery record");
        }
    }

    fn enter_lane(&self, trigger: MessageId) -> LaneGuard<'_> {
        let fresh = || {
            Arc::new(Lane {
                serial: tokio::sync::Mutex::new(()),
                cancel: self.shutdown.child_token(),
                users: AtomicUsize::new(0),
            })
        };
        let lane = match self.lanes.entry(trigger) {
            Entry::Occupied(occupied) if !occupied.get().cancel.is_cancelled() => {
                let lane = Arc::clone(occupied.get());
                lane.users.fetch_add(1, Ordering::AcqRel);
                lane
            },
            Entry::Occupied(mut occupied) => {
                // Invocations of a cancelled lane are on their way out; start
                // a new one.
                let lane = fresh();
                lane.users.fetch_add(1, Ordering::AcqRel);
                occupied.insert(Arc::clone(&lane));
                lane
            },
            Entry::Vacant(vacant) => {
                let lane = fresh();
                lane.users.fetch_add(1, Ordering::AcqRel);
                vacant.insert(Arc::clone(&lane));
                lane
            },
        };
        LaneGuard {
            lanes: &self.lanes,
            trigger,
            lane,
        }
    }

    /// Cancel every in-flight invocation of `trigger`. Returns whether any
    /// was running.
    pub fn cancel_trigger(&self, trigger: MessageId) -> bool {
        match self.lanes.get(&trigger) {
            Some(lane) => {
                lane.cancel.cancel();
                true
            },
            None => false,
        }
    }

    /// [`Dispatcher::cancel_trigger`], then wait until no invocation of
    /// `trigger` is still delivering.
    pub(crate) async fn cancel_and_drain(&self, trigger: MessageId) -> bool {
        let Some(lane) = self.lanes.get(&trigger).map(|lane| Arc::clone(lane.value())) else {
            return false;
        };
        lane.cancel.cancel();
        let _drained = lane.serial.lock().await;
        true
    }

    /// Cancel every in-flight invocation. Later dispatches are cancelled
    /// before admission.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Triggers with at least one invocation past the permission checks.
    #[must_use]
    pub fn active_triggers(&self) -> usize {
        self.lanes.len()
    }
}
