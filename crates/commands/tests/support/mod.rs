//! Shared mocks for dispatcher integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    herald_channels::{Error as TransportError, OutgoingMessage, Transport},
    herald_commands::{
        CommandEventSink, CommandRegistry, DispatchError, Dispatcher, EngineConfig,
        InMemoryDeliveryStore, Invocation, InvocationReport, Trigger,
    },
    herald_common::{ChannelId, MessageId},
    tokio::sync::Notify,
};

pub const CHANNEL: ChannelId = ChannelId(500);

// ── Mock transport ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send(MessageId, OutgoingMessage),
    Edit(MessageId, OutgoingMessage),
    BulkDelete(Vec<MessageId>),
    Delete(MessageId),
}

/// Transport that keeps sent messages in memory and records every call.
///
/// Bulk deletes fail as a whole when any id is missing or when
/// [`MockTransport::fail_bulk_deletes`] is set, leaving every message in
/// place.
pub struct MockTransport {
    next_id: AtomicU64,
    live: Mutex<BTreeMap<MessageId, OutgoingMessage>>,
    calls: Mutex<Vec<Call>>,
    fail_bulk: AtomicBool,
    fail_sends: AtomicBool,
    send_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1_000),
            live: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_bulk: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            send_gate: Mutex::new(None),
        })
    }

    pub fn fail_bulk_deletes(&self) {
        self.fail_bulk.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Hold every later send after it reaches the channel until the
    /// returned gate is notified once per send.
    pub fn hold_sends(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.send_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Delete a message behind the engine's back.
    pub fn vanish(&self, id: MessageId) {
        self.live.lock().unwrap().remove(&id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn message(&self, id: MessageId) -> Option<OutgoingMessage> {
        self.live.lock().unwrap().get(&id).cloned()
    }

    pub fn is_live(&self, id: MessageId) -> bool {
        self.live.lock().unwrap().contains_key(&id)
    }

    /// Content of every sent message, in send order.
    pub fn sent_contents(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(_, msg) => Some(msg.content.unwrap_or_default()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_message(
        &self,
        _channel: ChannelId,
        message: &OutgoingMessage,
    ) -> herald_channels::Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::unavailable("send refused"));
        }
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().unwrap().insert(id, message.clone());
        self.record(Call::Send(id, message.clone()));
        let gate = self.send_gate.lock().unwrap().clone();
        match gate {
            Some(gate) => gate.notified().await,
            // Yield like a real network call would.
            None => tokio::task::yield_now().await,
        }
        Ok(id)
    }

    async fn edit_message(
        &self,
        _channel: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> herald_channels::Result<()> {
        self.record(Call::Edit(message_id, message.clone()));
        let mut live = self.live.lock().unwrap();
        match live.get_mut(&message_id) {
            Some(existing) => {
                *existing = message.clone();
                Ok(())
            },
            None => Err(TransportError::not_found(format!("message {message_id}"))),
        }
    }

    async fn delete_messages(
        &self,
        _channel: ChannelId,
        message_ids: &[MessageId],
    ) -> herald_channels::Result<()> {
        self.record(Call::BulkDelete(message_ids.to_vec()));
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(TransportError::forbidden("bulk delete refused"));
        }
        let mut live = self.live.lock().unwrap();
        if let Some(missing) = message_ids.iter().find(|id| !live.contains_key(id)) {
            return Err(TransportError::not_found(format!("message {missing}")));
        }
        for id in message_ids {
            live.remove(id);
        }
        Ok(())
    }

    async fn delete_message(
        &self,
        _channel: ChannelId,
        message_id: MessageId,
    ) -> herald_channels::Result<()> {
        self.record(Call::Delete(message_id));
        match self.live.lock().unwrap().remove(&message_id) {
            Some(_) => Ok(()),
            None => Err(TransportError::not_found(format!("message {message_id}"))),
        }
    }
}

// ── Recording event sink ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Invoked(String),
    Completed(String),
    Error(String, &'static str),
    NotFound(String),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    last_error: Mutex<Option<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn completions(&self) -> usize {
        self.count(|e| matches!(e, Event::Completed(_)))
    }

    pub fn errors(&self) -> usize {
        self.count(|e| matches!(e, Event::Error(..)))
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl CommandEventSink for RecordingSink {
    async fn command_invoked(&self, invocation: &Invocation) {
        self.push(Event::Invoked(invocation.command().to_string()));
    }

    async fn command_completion(&self, invocation: &Invocation, _report: &InvocationReport) {
        self.push(Event::Completed(invocation.command().to_string()));
    }

    async fn command_error(&self, invocation: &Invocation, error: &DispatchError) {
        *self.last_error.lock().unwrap() = Some(error.to_string());
        self.push(Event::Error(invocation.command().to_string(), error.kind()));
    }

    async fn command_not_found(&self, _trigger: &Trigger, name: &str) {
        self.push(Event::NotFound(name.to_string()));
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// Engine defaults without the default cooldown, so tests can invoke the
/// same command back to back.
pub fn config_without_cooldown() -> EngineConfig {
    EngineConfig {
        default_cooldown: None,
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub transport: Arc<MockTransport>,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<InMemoryDeliveryStore>,
}

pub fn harness(registry: CommandRegistry) -> Harness {
    let transport = MockTransport::new();
    let sink = RecordingSink::new();
    let store = Arc::new(InMemoryDeliveryStore::new());
    let dispatcher = Dispatcher::builder(registry, transport.clone())
        .store(store.clone())
        .event_sink(sink.clone())
        .build();
    Harness {
        dispatcher: Arc::new(dispatcher),
        transport,
        sink,
        store,
    }
}

/// A trigger in [`CHANNEL`].
pub fn trigger(message_id: u64, author: u64, content: &str) -> Trigger {
    Trigger::new(message_id, CHANNEL, author, content)
}
