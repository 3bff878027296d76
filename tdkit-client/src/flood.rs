//! Per-sender ordering and flood control for incoming messages.
//!
//! Every message from a sender becomes a node linked to that sender's
//! previous node. A node waits for its predecessor to finish before it is
//! processed, so one sender's messages are handled strictly in arrival order
//! while different senders run in parallel. A sender whose chain grows past
//! the limits is dropped: the whole chain is cancelled and further messages
//! are ignored until the chain expires from the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tdkit_bridge::{Message, Update, UserId};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Client, dispatch};

/// Running (non-stale) messages a sender may have before being dropped.
pub const MAX_ACTIVE_PER_SENDER: usize = 100;
/// Chain length a sender may reach before being dropped.
pub const MAX_QUEUED_PER_SENDER: usize = 300;
/// Messages older than this on arrival skip the ordering wait.
pub const STALE_AFTER: Duration = Duration::from_secs(30);
/// Chain length above which each message is additionally delayed.
pub const BACKOFF_THRESHOLD: usize = 50;
/// Per-queued-message delay once past [`BACKOFF_THRESHOLD`].
pub const BACKOFF_UNIT: Duration = Duration::from_millis(10);
/// Idle time after which a sender's chain is forgotten (and a drop lifted).
pub const CHAIN_IDLE_TTL: Duration = Duration::from_secs(5 * 60);

/// Flood-control limits. Defaults are the constants above.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FloodPolicy {
    pub max_active: usize,
    pub max_queued: usize,
    pub stale_after: Duration,
    pub backoff_threshold: usize,
    pub backoff_unit: Duration,
    pub idle_ttl: Duration,
}

impl Default for FloodPolicy {
    fn default() -> Self {
        Self {
            max_active: MAX_ACTIVE_PER_SENDER,
            max_queued: MAX_QUEUED_PER_SENDER,
            stale_after: STALE_AFTER,
            backoff_threshold: BACKOFF_THRESHOLD,
            backoff_unit: BACKOFF_UNIT,
            idle_ttl: CHAIN_IDLE_TTL,
        }
    }
}

// ─── ChainNode ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeState {
    Pending,
    /// Processing started at `started`; the next node waits until `started + delay`.
    Done { started: Instant, delay: Duration },
    Cancelled,
}

pub(crate) struct ChainNode {
    state: watch::Sender<NodeState>,
    cancel: CancellationToken,
    stale: bool,
    parent: Mutex<Option<Arc<ChainNode>>>,
}

impl ChainNode {
    pub(crate) fn new(stale: bool, parent: Option<Arc<ChainNode>>) -> Arc<Self> {
        Arc::new(Self {
            state: watch::Sender::new(NodeState::Pending),
            cancel: CancellationToken::new(),
            stale,
            parent: Mutex::new(parent),
        })
    }

    fn parent(&self) -> Option<Arc<ChainNode>> {
        self.parent.lock().clone()
    }

    /// A cancelled node with no predecessor. Cached in place of a dropped
    /// sender's chain so their messages are ignored until it expires.
    pub(crate) fn tombstone() -> Arc<Self> {
        let node = Self::new(false, None);
        node.cancel.cancel();
        node
    }

    /// Forget the predecessor so the chain cannot grow.
    pub(crate) fn detach(&self) {
        self.parent.lock().take();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || *self.state.borrow() == NodeState::Cancelled
    }

    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && *self.state.borrow() == NodeState::Pending
    }

    /// Consecutive running, non-stale nodes ending here.
    pub(crate) fn active_count(&self) -> usize {
        if self.stale || !self.is_active() {
            return 0;
        }
        let mut count = 1;
        let mut next = self.parent();
        while let Some(node) = next {
            if node.stale || !node.is_active() {
                break;
            }
            count += 1;
            next = node.parent();
        }
        count
    }

    /// Length of the chain ending here.
    pub(crate) fn count(&self) -> usize {
        let mut count = 1;
        let mut next = self.parent();
        while let Some(node) = next {
            count += 1;
            next = node.parent();
        }
        count
    }

    /// Cancel this node and every running ancestor.
    pub(crate) fn drop_chain(&self) {
        if !self.is_active() {
            return;
        }
        self.cancel.cancel();
        let mut next = self.parent();
        while let Some(node) = next {
            if !node.is_active() {
                break;
            }
            node.cancel.cancel();
            next = node.parent();
        }
    }

    fn finish(&self, state: NodeState) {
        self.state.send_replace(state);
    }

    /// Resolve once this node is done or cancelled.
    async fn settled(&self) -> NodeState {
        let mut rx = self.state.subscribe();
        tokio::select! {
            _ = self.cancel.cancelled() => NodeState::Cancelled,
            state = rx.wait_for(|s| *s != NodeState::Pending) => {
                state.map(|s| *s).unwrap_or(NodeState::Cancelled)
            }
        }
    }
}

impl Drop for ChainNode {
    fn drop(&mut self) {
        // Unlink iteratively; a long chain would otherwise drop recursively.
        let mut next = self.parent.get_mut().take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.parent.get_mut().take(),
                Err(_) => break,
            }
        }
    }
}

// ─── ChainCache ───────────────────────────────────────────────────────────────

struct CacheEntry {
    node: Arc<ChainNode>,
    touched: Instant,
}

/// Last chain node per sender, forgotten after `ttl` without messages.
pub(crate) struct ChainCache {
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<UserId, CacheEntry>,
    last_sweep: Instant,
}

impl ChainCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(CacheInner { entries: HashMap::new(), last_sweep: Instant::now() }),
        }
    }

    pub(crate) fn get(&self, sender: UserId) -> Option<Arc<ChainNode>> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let entries = &mut guard.entries;
        let expired = now.duration_since(entries.get(&sender)?.touched) > self.ttl;
        if expired {
            entries.remove(&sender);
            return None;
        }
        let entry = entries.get_mut(&sender)?;
        entry.touched = now;
        Some(entry.node.clone())
    }

    pub(crate) fn put(&self, sender: UserId, node: Arc<ChainNode>) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if now.duration_since(inner.last_sweep) > self.ttl {
            let ttl = self.ttl;
            inner.entries.retain(|_, e| now.duration_since(e.touched) <= ttl);
            inner.last_sweep = now;
        }
        inner.entries.insert(sender, CacheEntry { node, touched: now });
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

// ─── Admission ────────────────────────────────────────────────────────────────

fn is_stale(message: &Message, stale_after: Duration) -> bool {
    let age = chrono::Utc::now().timestamp() - message.date;
    age > stale_after.as_secs() as i64
}

fn is_exempt(client: &Client, sender: UserId, message: &Message) -> bool {
    if sender == 0 {
        return true;
    }
    let Some(me) = client.me() else { return false };
    if sender == me.id {
        return true;
    }
    match &client.config().flood_exempt {
        Some(exempt) => exempt(sender, message),
        // User accounts answer people they chose to talk to.
        None => !me.is_bot(),
    }
}

/// Admit a new message into its sender's chain. Runs on the receive thread.
pub(crate) fn post_message(client: &Client, message: Message) {
    let policy = client.config().flood;
    let sender = message.sender_user_id().unwrap_or(0);
    let stale = is_stale(&message, policy.stale_after);
    let last = client.inner.flood.get(sender);

    let mut count = 0;
    if let Some(last) = &last {
        if last.is_cancelled() {
            tracing::trace!("[{}] message from dropped sender {sender} ignored", client.name());
            return;
        }
        let active = last.active_count();
        count = last.count();
        let exempt = is_exempt(client, sender, &message);
        if !exempt && (active > policy.max_active || count > policy.max_queued) {
            last.drop_chain();
            client.inner.flood.put(sender, ChainNode::tombstone());
            let notifier = client.clone();
            client.spawn(async move { notifier.sender_dropped(sender).await });
            return;
        }
        if exempt {
            last.detach();
        }
    }

    let node = ChainNode::new(stale, last.clone());
    client.inner.flood.put(sender, node.clone());
    client.spawn(run_node(client.clone(), node, last, count, message));
}

async fn run_node(client: Client, node: Arc<ChainNode>, parent: Option<Arc<ChainNode>>, count: usize, message: Message) {
    let policy = client.config().flood;
    let cancel = node.cancel.clone();
    let stale = node.stale;

    let work = async move {
        if !stale {
            if let Some(parent) = parent {
                match parent.settled().await {
                    NodeState::Done { started, delay } if !delay.is_zero() => {
                        tokio::time::sleep_until(started + delay).await;
                    }
                    NodeState::Done { .. } => {}
                    NodeState::Cancelled | NodeState::Pending => return None,
                }
            }
            if count > policy.backoff_threshold {
                tokio::time::sleep(policy.backoff_unit * count as u32).await;
            }
        }
        let started = Instant::now();
        let delay = dispatch::process(&client, Update::NewMessage { message }).await;
        Some((started, delay))
    };

    let outcome = tokio::select! {
        _ = cancel.cancelled() => None,
        outcome = work => outcome,
    };
    node.finish(match outcome {
        Some((started, delay)) => NodeState::Done { started, delay },
        None => NodeState::Cancelled,
    });
}
