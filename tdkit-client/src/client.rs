//! [`Client`]: one native client instance and everything attached to it.

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use parking_lot::{Mutex, RwLock};
use tdkit_bridge::functions::{AnswerCallbackQuery, Close, GetOption, GetUser, SendMessage};
use tdkit_bridge::{
    AuthorizationState, ChatId, ClientId, FromObject, Function, Message, Request, User, UserId,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, Maintenance};
use crate::correlation::{Continuation, Outcome, Pending, PendingTable};
use crate::errors::{Error, Result};
use crate::flood::ChainCache;
use crate::gate::Gate;
use crate::handler::{Handler, Registry, same_handler};
use crate::persist::Persist;
use crate::runtime::Runtime;

/// A client bound to one native client instance.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    runtime: Runtime,
    id: ClientId,
    config: ClientConfig,

    start_requested: AtomicBool,
    stop_requested: AtomicBool,
    pub(crate) login_failed: AtomicBool,
    pub(crate) started: Gate,
    pub(crate) authenticating: Gate,
    pub(crate) authenticated: Gate,
    pub(crate) closed: Gate,
    /// Cancelled by `stop` or once the native client starts closing; aborts interactive login.
    pub(crate) stopping: CancellationToken,
    /// Cancelled on close; stops scheduled maintenance.
    pub(crate) maintenance: CancellationToken,

    pub(crate) pending: PendingTable,
    handlers: RwLock<Vec<Arc<dyn Handler>>>,
    registry: Registry,
    blocked: DashSet<UserId>,
    pub(crate) me: RwLock<Option<User>>,
    pub(crate) flood: ChainCache,

    auth_tx: mpsc::UnboundedSender<AuthorizationState>,
    auth_rx: Mutex<Option<mpsc::UnboundedReceiver<AuthorizationState>>>,
}

impl Client {
    /// Allocate a native client on `runtime`'s bridge. Nothing is sent until
    /// [`start`](Self::start).
    pub fn new(runtime: &Runtime, config: ClientConfig) -> Self {
        let id = runtime.bridge().create_client();
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let flood = ChainCache::new(config.flood.idle_ttl);
        Self {
            inner: Arc::new(ClientInner {
                runtime: runtime.clone(),
                id,
                config,
                start_requested: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                login_failed: AtomicBool::new(false),
                started: Gate::new(false),
                authenticating: Gate::new(false),
                authenticated: Gate::new(false),
                closed: Gate::new(false),
                stopping: CancellationToken::new(),
                maintenance: CancellationToken::new(),
                pending: PendingTable::new(),
                handlers: RwLock::new(Vec::new()),
                registry: Registry::default(),
                blocked: DashSet::new(),
                me: RwLock::new(None),
                flood,
                auth_tx,
                auth_rx: Mutex::new(Some(auth_rx)),
            }),
        }
    }

    pub fn id(&self) -> ClientId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// This account, once logged in.
    pub fn me(&self) -> Option<User> {
        self.inner.me.read().clone()
    }

    /// This account's id, `0` before login.
    pub fn me_id(&self) -> UserId {
        self.inner.me.read().as_ref().map_or(0, |u| u.id)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Register with the runtime and begin authorization.
    ///
    /// Fails with [`Error::AlreadyStarted`] on a second call.
    pub fn start(&self) -> Result<()> {
        if self.inner.start_requested.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        if let Some(states) = self.inner.auth_rx.lock().take() {
            let client = self.clone();
            self.spawn(async move { client.run_authorization(states).await });
        }

        self.inner.authenticating.set(true);
        self.inner.runtime.register(self);
        self.inner.started.set(true);
        self.send_raw(GetOption { name: "version".into() })?;
        self.inner.runtime.ensure_receiver()?;

        if let Some(Maintenance { save_every, gc_every }) = self.inner.config.maintenance {
            self.schedule_maintenance(save_every, gc_every);
        }
        tracing::info!("[{}] Started", self.name());
        Ok(())
    }

    /// Ask the native client to close. Idempotent.
    pub fn stop(&self) -> Result<()> {
        if !self.inner.started.get() {
            return Err(Error::NotStarted);
        }
        if self.inner.stop_requested.swap(true, Ordering::AcqRel) || self.is_closed() {
            return Ok(());
        }
        self.inner.stopping.cancel();
        self.send_raw(Close {})
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.get()
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stop_requested.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    fn ensure_started(&self) -> Result<()> {
        match self.start() {
            Ok(()) | Err(Error::AlreadyStarted) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn wait_for_start(&self) {
        self.inner.started.wait_for(true).await;
    }

    /// Start if needed and wait for any in-flight login to settle.
    ///
    /// Returns whether the client is logged in, or
    /// [`Error::InputExhausted`] if login ran out of credentials.
    pub async fn wait_for_auth(&self) -> Result<bool> {
        self.ensure_started()?;
        self.inner.authenticating.wait_for(false).await;
        if self.inner.login_failed.load(Ordering::Acquire) {
            return Err(Error::InputExhausted);
        }
        Ok(self.inner.authenticated.get())
    }

    /// Start if needed and wait until logged in.
    pub async fn wait_for_login(&self) -> Result<()> {
        self.ensure_started()?;
        tokio::select! {
            _ = self.inner.authenticated.wait_for(true) => Ok(()),
            _ = self.inner.closed.wait_for(true) => {
                if self.inner.login_failed.load(Ordering::Acquire) {
                    Err(Error::InputExhausted)
                } else {
                    Err(Error::ClientClosed)
                }
            }
        }
    }

    /// Wait until the native client reports it has closed.
    pub async fn wait_for_close(&self) {
        self.inner.closed.wait_for(true).await;
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    /// Send a request and wait for its result.
    ///
    /// `sendMessage`, `sendMessageAlbum` and `forwardMessages` resolve only
    /// once the messages are actually sent, with the final messages.
    /// Protocol errors carry the location of this call.
    #[track_caller]
    pub fn call<F: Function>(&self, function: F) -> impl Future<Output = Result<F::Return>> + Send + use<F> {
        let location = Location::caller();
        let submitted = self.submit(function.into(), location);
        async move {
            let (request, rx) = submitted?;
            let object = rx.await.map_err(|_| Error::Cancelled)??;
            let got = object.type_name();
            F::Return::from_object(object).ok_or(Error::UnexpectedResult {
                request,
                expected: F::Return::TYPE_NAME,
                got,
            })
        }
    }

    fn submit(
        &self,
        request: Request,
        location: &'static Location<'static>,
    ) -> Result<(&'static str, oneshot::Receiver<Outcome>)> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        let type_name = request.type_name();
        let (tx, rx) = oneshot::channel();
        let id = self.inner.pending.next_id();
        let continuation = Continuation::for_request(&request, tx);
        self.inner.pending.register(id, Pending { continuation, request: type_name, location });

        // Closing cancels what is registered; anything later must not wait forever.
        if self.is_closed() {
            self.inner.pending.forget(id);
            return Err(Error::ClientClosed);
        }

        tracing::trace!("[{}] send #{id} {type_name}", self.name());
        if let Err(e) = self.inner.runtime.bridge().submit(self.id(), id, request) {
            self.inner.pending.forget(id);
            return Err(e.into());
        }
        Ok((type_name, rx))
    }

    /// Send a request without waiting for, or keeping, its result.
    pub fn send_raw(&self, request: impl Into<Request>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        let request = request.into();
        let id = self.inner.pending.next_id();
        tracing::trace!("[{}] send #{id} {} (raw)", self.name(), request.type_name());
        self.inner.runtime.bridge().submit(self.id(), id, request)?;
        Ok(())
    }

    /// Send a plain text message and wait until it is delivered.
    pub async fn send_text(&self, chat_id: ChatId, text: impl Into<String>) -> Result<Message> {
        self.call(SendMessage::text(chat_id, text)).await
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.call(GetUser { user_id }).await
    }

    pub async fn answer_callback_query(&self, query_id: i64, text: impl Into<String>, show_alert: bool) -> Result<()> {
        self.call(AnswerCallbackQuery {
            callback_query_id: query_id,
            text: text.into(),
            show_alert,
            url: String::new(),
            cache_time: 0,
        })
        .await
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    /// Load `handler` and append it to the chain, claiming its registration keys.
    pub async fn add_handler(&self, handler: Arc<dyn Handler>) -> anyhow::Result<()> {
        handler.on_load(self).await?;
        self.inner.registry.register(&handler, handler.registration());
        self.inner.handlers.write().push(handler);
        Ok(())
    }

    /// Remove `handler` and every key routed to it. Returns whether it was present.
    pub fn remove_handler(&self, handler: &Arc<dyn Handler>) -> bool {
        let removed = {
            let mut handlers = self.inner.handlers.write();
            let before = handlers.len();
            handlers.retain(|h| !same_handler(h, handler));
            handlers.len() != before
        };
        self.inner.registry.unregister(handler);
        removed
    }

    /// Snapshot of the handler chain, in registration order.
    pub fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.inner.handlers.read().clone()
    }

    pub fn register_function(&self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        self.inner.registry.add_function(name.into(), handler);
    }

    pub fn register_payload(&self, key: impl Into<String>, handler: Arc<dyn Handler>) {
        self.inner.registry.add_payload(key.into(), handler);
    }

    pub fn register_callback(&self, id: i32, handler: Arc<dyn Handler>) {
        self.inner.registry.add_callback(id, handler);
    }

    pub fn register_persist_handler(&self, id: i32, handler: Arc<dyn Handler>) {
        self.inner.registry.add_persist(id, handler);
    }

    pub(crate) fn function_handler(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.inner.registry.function(name)
    }

    pub(crate) fn payload_handler(&self, key: &str) -> Option<Arc<dyn Handler>> {
        self.inner.registry.payload(key)
    }

    pub(crate) fn callback_handler(&self, id: i32) -> Option<Arc<dyn Handler>> {
        self.inner.registry.callback(id)
    }

    pub(crate) fn persist_handler(&self, id: i32) -> Option<Arc<dyn Handler>> {
        self.inner.registry.persist(id)
    }

    // ── Conversation state ────────────────────────────────────────────────────

    pub fn read_persist(&self, user_id: UserId) -> Option<Persist> {
        self.inner.config.persist_store.read(user_id)
    }

    pub fn write_persist(&self, user_id: UserId, persist: Persist) {
        self.inner.config.persist_store.write(user_id, persist);
    }

    pub fn remove_persist(&self, user_id: UserId) -> Option<Persist> {
        self.inner.config.persist_store.remove(user_id)
    }

    // ── Block list ────────────────────────────────────────────────────────────

    pub fn block_user(&self, user_id: UserId) {
        self.inner.blocked.insert(user_id);
    }

    pub fn unblock_user(&self, user_id: UserId) {
        self.inner.blocked.remove(&user_id);
    }

    pub fn is_blocked(&self, user_id: UserId) -> bool {
        self.inner.blocked.contains(&user_id)
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    /// Flush conversation state and every handler's cache.
    pub async fn save_cache(&self) -> anyhow::Result<()> {
        self.called("save cache");
        for handler in self.handlers() {
            if let Err(e) = handler.save_cache(self).await {
                self.report_request_error(e, "save_cache");
            }
        }
        let store = &self.inner.config.persist_store;
        store.save_all()?;
        tracing::debug!("[{}] {} persist store saved", self.name(), store.name());
        Ok(())
    }

    /// Drop expired conversation state and every handler's garbage.
    pub async fn gc(&self) -> anyhow::Result<()> {
        self.called("gc");
        for handler in self.handlers() {
            if let Err(e) = handler.gc(self).await {
                self.report_request_error(e, "gc");
            }
        }
        let store = &self.inner.config.persist_store;
        store.gc()?;
        tracing::debug!("[{}] {} persist store collected", self.name(), store.name());
        Ok(())
    }

    /// Run [`save_cache`](Self::save_cache) and [`gc`](Self::gc) periodically
    /// until the client closes. Started by `start` when
    /// [`ClientConfig::maintenance`] is set.
    pub fn schedule_maintenance(&self, save_every: Duration, gc_every: Duration) {
        let client = self.clone();
        let closed = self.inner.maintenance.clone();
        self.spawn(async move {
            let mut save = interval_at(Instant::now() + save_every, save_every);
            let mut gc = interval_at(Instant::now() + gc_every, gc_every);
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    _ = save.tick() => {
                        if let Err(e) = client.save_cache().await {
                            client.report_request_error(e, "scheduled save");
                        }
                    }
                    _ = gc.tick() => {
                        if let Err(e) = client.gc().await {
                            client.report_request_error(e, "scheduled gc");
                        }
                    }
                }
            }
        });
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.runtime.spawn(future);
    }

    pub(crate) fn enqueue_authorization_state(&self, state: AuthorizationState) {
        // Abort a pending prompt so the queue reaches the closing states.
        if matches!(
            state,
            AuthorizationState::LoggingOut | AuthorizationState::Closing | AuthorizationState::Closed
        ) {
            self.inner.stopping.cancel();
        }
        if self.inner.auth_tx.send(state).is_err() {
            tracing::trace!("[{}] authorization state after close ignored", self.name());
        }
    }

    pub(crate) fn report_request_error(&self, error: anyhow::Error, context: &str) {
        self.inner.config.error_handler.on_request_error(self, &error, context);
    }

    pub(crate) async fn sender_dropped(&self, user_id: UserId) {
        let minutes = self.inner.config.flood.idle_ttl.as_secs() / 60;
        self.warn_user_called(user_id, format!("dropped for {minutes} min")).await;
        for handler in self.handlers() {
            if let Err(e) = handler.on_sender_dropped(self, user_id).await {
                self.report_request_error(e, "on_sender_dropped");
            }
        }
    }

    /// Pending requests and message sends, for diagnostics.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Senders with a live flood-control chain.
    pub fn tracked_senders(&self) -> usize {
        self.inner.flood.len()
    }
}
