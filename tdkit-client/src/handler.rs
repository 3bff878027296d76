//! The [`Handler`] trait and its registration tables.
//!
//! A client holds an ordered list of handlers. Lifecycle hooks are called on
//! every handler in registration order; message hooks are called in order
//! until one returns [`Flow::Stop`]. Commands, start payloads, callback ids
//! and persist ids are routed to exactly the handler that registered them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tdkit_bridge::{CallbackQuery, ChatId, InlineCallbackQuery, Message, Update, UserId};

use crate::Client;
use crate::command::{Command, StartPayload};
use crate::persist::Persist;

// ─── Flow ─────────────────────────────────────────────────────────────────────

/// What the pipeline does after a hook returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Pass the event on to the next hook.
    Continue,
    /// The event is handled; no later hook sees it.
    Stop,
    /// Handled; the sender's next message waits until `delay` after this one started.
    StopWithDelay(Duration),
}

impl Flow {
    pub fn is_stop(self) -> bool {
        !matches!(self, Self::Continue)
    }

    /// Routed events are consumed even when the hook returned `Continue`.
    pub(crate) fn consumed(self) -> Self {
        match self {
            Self::Continue => Self::Stop,
            other => other,
        }
    }

    /// Delay requested for the sender's next message.
    pub fn delay(self) -> Duration {
        match self {
            Self::StopWithDelay(d) => d,
            _ => Duration::ZERO,
        }
    }
}

pub type HandlerResult = anyhow::Result<Flow>;

// ─── MessageContext ───────────────────────────────────────────────────────────

/// An incoming message with its sender resolved.
#[derive(Clone, Debug)]
pub struct MessageContext {
    /// Sending user, `0` when a chat or channel sent it.
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub message: Message,
}

impl MessageContext {
    pub fn new(message: Message) -> Self {
        Self {
            user_id: message.sender_user_id().unwrap_or(0),
            chat_id: message.chat_id,
            message,
        }
    }

    pub fn is_private(&self) -> bool {
        self.message.is_private()
    }
}

// ─── Registration ─────────────────────────────────────────────────────────────

/// Routing keys a handler claims when added to a client.
#[derive(Clone, Debug, Default)]
pub struct Registration {
    pub functions: Vec<String>,
    pub payloads: Vec<String>,
    pub callbacks: Vec<i32>,
    pub persists: Vec<i32>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.functions.push(name.into());
        self
    }

    pub fn payload(mut self, key: impl Into<String>) -> Self {
        self.payloads.push(key.into());
        self
    }

    pub fn callback(mut self, id: i32) -> Self {
        self.callbacks.push(id);
        self
    }

    pub fn persist(mut self, id: i32) -> Self {
        self.persists.push(id);
        self
    }
}

// ─── Handler ──────────────────────────────────────────────────────────────────

/// A listener for lifecycle, message and command events.
///
/// Every hook has a no-op default. Errors returned from message hooks are
/// handed to the client's [`ErrorHandler`](crate::ErrorHandler) and end the
/// pipeline for that update.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Routing keys claimed when the handler is added.
    fn registration(&self) -> Registration {
        Registration::default()
    }

    // ── Lifecycle ──

    async fn on_load(&self, _client: &Client) -> anyhow::Result<()> { Ok(()) }

    async fn before_login(&self, _client: &Client) -> anyhow::Result<()> { Ok(()) }

    async fn on_login(&self, _client: &Client) -> anyhow::Result<()> { Ok(()) }

    async fn on_logout(&self, _client: &Client) -> anyhow::Result<()> { Ok(()) }

    async fn on_destroy(&self, _client: &Client) -> anyhow::Result<()> { Ok(()) }

    async fn save_cache(&self, _client: &Client) -> anyhow::Result<()> { Ok(()) }

    async fn gc(&self, _client: &Client) -> anyhow::Result<()> { Ok(()) }

    // ── Updates ──

    /// Every update, after the built-in routing.
    async fn on_update(&self, _client: &Client, _update: &Update) -> HandlerResult {
        Ok(Flow::Continue)
    }

    /// Every accepted message, before command routing.
    async fn on_new_message(&self, _client: &Client, _ctx: &MessageContext) -> HandlerResult {
        Ok(Flow::Continue)
    }

    /// Bare `/start`, or any private message nothing else handled.
    async fn on_launch(&self, _client: &Client, _ctx: &MessageContext) -> HandlerResult {
        Ok(Flow::Continue)
    }

    /// A command this handler registered.
    async fn on_function(&self, _client: &Client, _ctx: &MessageContext, _command: &Command) -> HandlerResult {
        Ok(Flow::Stop)
    }

    async fn on_undefined_function(&self, _client: &Client, _ctx: &MessageContext, _command: &Command) -> HandlerResult {
        Ok(Flow::Continue)
    }

    /// A `/start <payload>` whose key this handler registered.
    async fn on_start_payload(&self, _client: &Client, _ctx: &MessageContext, _payload: &StartPayload) -> HandlerResult {
        Ok(Flow::Stop)
    }

    async fn on_undefined_payload(&self, _client: &Client, _ctx: &MessageContext, _payload: &StartPayload) -> HandlerResult {
        Ok(Flow::Continue)
    }

    // ── Conversation state ──

    async fn on_persist_message(&self, _client: &Client, _ctx: &MessageContext, _persist: &Persist) -> HandlerResult {
        Ok(Flow::Stop)
    }

    async fn on_persist_function(
        &self,
        _client: &Client,
        _ctx: &MessageContext,
        _persist: &Persist,
        _command: &Command,
    ) -> HandlerResult {
        Ok(Flow::Stop)
    }

    async fn on_persist_cancel(&self, _client: &Client, _ctx: &MessageContext, _persist: &Persist) -> HandlerResult {
        Ok(Flow::Continue)
    }

    /// Runs after the state is gone, whether cancelled by the user or removed.
    async fn on_persist_remove_or_cancel(
        &self,
        _client: &Client,
        _user_id: UserId,
        _chat_id: ChatId,
        _persist: &Persist,
    ) -> HandlerResult {
        Ok(Flow::Continue)
    }

    /// Tell the user their dialog was cancelled.
    async fn on_send_canceled_message(&self, client: &Client, _user_id: UserId, chat_id: ChatId) -> HandlerResult {
        if let Some(text) = client.config().canceled_text.clone() {
            client.send_text(chat_id, text).await?;
        }
        Ok(Flow::Stop)
    }

    // ── Buttons ──

    /// `data` holds the payload fields after the registration id.
    async fn on_callback_query(&self, _client: &Client, _query: &CallbackQuery, _data: &[Vec<u8>]) -> HandlerResult {
        Ok(Flow::Stop)
    }

    async fn on_inline_callback_query(
        &self,
        _client: &Client,
        _query: &InlineCallbackQuery,
        _data: &[Vec<u8>],
    ) -> HandlerResult {
        Ok(Flow::Stop)
    }

    // ── Flood control ──

    /// The sender exceeded the flood limits and is ignored for a while.
    async fn on_sender_dropped(&self, _client: &Client, _user_id: UserId) -> anyhow::Result<()> { Ok(()) }
}

// ─── Registry ─────────────────────────────────────────────────────────────────

pub(crate) fn same_handler(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Routing tables from key to handler.
#[derive(Default)]
pub(crate) struct Registry {
    functions: DashMap<String, Arc<dyn Handler>>,
    payloads: DashMap<String, Arc<dyn Handler>>,
    callbacks: DashMap<i32, Arc<dyn Handler>>,
    persists: DashMap<i32, Arc<dyn Handler>>,
}

impl Registry {
    pub(crate) fn register(&self, handler: &Arc<dyn Handler>, registration: Registration) {
        for name in registration.functions {
            self.add_function(name, handler.clone());
        }
        for key in registration.payloads {
            self.add_payload(key, handler.clone());
        }
        for id in registration.callbacks {
            self.add_callback(id, handler.clone());
        }
        for id in registration.persists {
            self.add_persist(id, handler.clone());
        }
    }

    pub(crate) fn unregister(&self, handler: &Arc<dyn Handler>) {
        self.functions.retain(|_, h| !same_handler(h, handler));
        self.payloads.retain(|_, h| !same_handler(h, handler));
        self.callbacks.retain(|_, h| !same_handler(h, handler));
        self.persists.retain(|_, h| !same_handler(h, handler));
    }

    pub(crate) fn add_function(&self, name: String, handler: Arc<dyn Handler>) {
        if let Some(old) = self.functions.insert(name.clone(), handler) {
            tracing::warn!("[tdkit] function /{name} of {} replaced", old.name());
        }
    }

    pub(crate) fn add_payload(&self, key: String, handler: Arc<dyn Handler>) {
        if let Some(old) = self.payloads.insert(key.clone(), handler) {
            tracing::warn!("[tdkit] payload {key} of {} replaced", old.name());
        }
    }

    pub(crate) fn add_callback(&self, id: i32, handler: Arc<dyn Handler>) {
        if let Some(old) = self.callbacks.insert(id, handler) {
            tracing::warn!("[tdkit] callback {id} of {} replaced", old.name());
        }
    }

    pub(crate) fn add_persist(&self, id: i32, handler: Arc<dyn Handler>) {
        if let Some(old) = self.persists.insert(id, handler) {
            tracing::warn!("[tdkit] persist {id} of {} replaced", old.name());
        }
    }

    pub(crate) fn function(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.functions.get(name).map(|h| h.clone())
    }

    pub(crate) fn payload(&self, key: &str) -> Option<Arc<dyn Handler>> {
        self.payloads.get(key).map(|h| h.clone())
    }

    pub(crate) fn callback(&self, id: i32) -> Option<Arc<dyn Handler>> {
        self.callbacks.get(&id).map(|h| h.clone())
    }

    pub(crate) fn persist(&self, id: i32) -> Option<Arc<dyn Handler>> {
        self.persists.get(&id).map(|h| h.clone())
    }
}
