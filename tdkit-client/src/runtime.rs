//! The shared runtime: bridge, client registry and receive thread.
//!
//! One [`Runtime`] drives any number of clients over one bridge. The bridge
//! is polled by a single dedicated OS thread, started when the first client
//! starts; all handler code runs on the tokio runtime captured at
//! construction.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use dashmap::DashMap;
use parking_lot::Mutex;
use tdkit_bridge::{ClientId, Event, NativeBridge, TdObject};
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

use crate::config::RuntimeConfig;
use crate::errors::{Error, Result};
use crate::{Client, dispatch};

#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    bridge: Arc<dyn NativeBridge>,
    handle: Handle,
    config: RuntimeConfig,
    clients: DashMap<ClientId, Client>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    tasks: TaskTracker,
}

impl Runtime {
    /// Must be called from within a tokio runtime.
    pub fn new(bridge: Arc<dyn NativeBridge>) -> Result<Self> {
        Self::with_config(bridge, RuntimeConfig::default())
    }

    pub fn with_config(bridge: Arc<dyn NativeBridge>, config: RuntimeConfig) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| Error::NoReactor)?;
        let runtime = Self {
            inner: Arc::new(RuntimeInner {
                bridge,
                handle,
                config,
                clients: DashMap::new(),
                receiver: Mutex::new(None),
                running: AtomicBool::new(false),
                tasks: TaskTracker::new(),
            }),
        };
        if runtime.inner.config.shutdown_on_ctrl_c {
            runtime.shutdown_on_ctrl_c();
        }
        Ok(runtime)
    }

    pub fn bridge(&self) -> &Arc<dyn NativeBridge> {
        &self.inner.bridge
    }

    /// Every started client that has not closed yet.
    pub fn clients(&self) -> Vec<Client> {
        self.inner.clients.iter().map(|c| c.value().clone()).collect()
    }

    pub(crate) fn register(&self, client: &Client) {
        self.inner.clients.insert(client.id(), client.clone());
    }

    pub(crate) fn unregister(&self, client_id: ClientId) {
        self.inner.clients.remove(&client_id);
    }

    /// Run `future` on the worker pool, tracked for shutdown.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tasks.spawn_on(future, &self.inner.handle);
    }

    /// Start the receive thread if it is not running.
    pub(crate) fn ensure_receiver(&self) -> Result<()> {
        let mut receiver = self.inner.receiver.lock();
        if receiver.is_some() {
            return Ok(());
        }
        self.inner.running.store(true, Ordering::Release);
        let weak = Arc::downgrade(&self.inner);
        let thread = std::thread::Builder::new()
            .name("tdkit-receive".into())
            .spawn(move || receive_loop(weak))?;
        *receiver = Some(thread);
        tracing::debug!("[tdkit] receive thread started");
        Ok(())
    }

    /// Stop every live client, wait for them to close, then stop the receive
    /// thread and wait for outstanding handler tasks.
    ///
    /// Must not be awaited from inside a handler: it waits for those tasks.
    pub async fn shutdown(&self) {
        tracing::info!("[tdkit] Stopping...");
        let clients = self.clients();
        for client in &clients {
            if let Err(e) = client.stop() {
                tracing::debug!("[{}] stop: {e}", client.name());
            }
        }
        for client in &clients {
            client.wait_for_close().await;
        }

        tracing::info!("[tdkit] Closing receive thread");
        self.inner.running.store(false, Ordering::Release);
        let receiver = self.inner.receiver.lock().take();
        if let Some(thread) = receiver {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
        tracing::info!("[tdkit] Stopped");
    }

    /// Call [`shutdown`](Self::shutdown) when the process receives Ctrl-C.
    pub fn shutdown_on_ctrl_c(&self) {
        let runtime = self.clone();
        self.inner.handle.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                runtime.shutdown().await;
            }
        });
    }
}

fn receive_loop(weak: Weak<RuntimeInner>) {
    loop {
        let Some(inner) = weak.upgrade() else { break };
        if !inner.running.load(Ordering::Acquire) {
            break;
        }
        for event in inner.bridge.poll(inner.config.poll_timeout) {
            inner.route(event);
        }
    }
    tracing::debug!("[tdkit] receive thread stopped");
}

impl RuntimeInner {
    fn route(&self, event: Event) {
        let Some(client) = self.clients.get(&event.client_id).map(|c| c.value().clone()) else {
            tracing::trace!("[tdkit] {} for unknown client {} dropped", event.object.type_name(), event.client_id);
            return;
        };

        if !event.is_update() {
            let type_name = event.object.type_name();
            if client.inner.pending.resolve(event.request_id, event.object) {
                tracing::trace!("[{}] received #{} {type_name}", client.name(), event.request_id);
            } else {
                tracing::trace!("[{}] received #{} {type_name} (no handler)", client.name(), event.request_id);
            }
            return;
        }

        match event.object {
            TdObject::Update(update) => dispatch::post_update(&client, update),
            other => tracing::trace!("[{}] unsolicited {} dropped", client.name(), other.type_name()),
        }
    }
}
