//! Request correlation: pending requests keyed by request id, and pending
//! message sends keyed by placeholder message id.
//!
//! Everything here runs on the receive thread. Resolving only completes a
//! oneshot channel; the awaiting task resumes on the worker pool.

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tdkit_bridge::{Message, MessageId, Messages, Request, RequestId, TdObject};
use tokio::sync::oneshot;

use crate::errors::{Error, ProtocolError, TRANSIENT_ERROR_CODE};

pub(crate) type Outcome = Result<TdObject, Error>;

/// What to do with the result of a request.
pub(crate) enum Continuation {
    /// Deliver the result as is.
    Reply(oneshot::Sender<Outcome>),
    /// The result is a placeholder message; wait for its send to finish.
    SendMessage(oneshot::Sender<Outcome>),
    /// The result is a list of placeholders; wait for all of them.
    SendMessages(oneshot::Sender<Outcome>),
}

impl Continuation {
    pub(crate) fn for_request(request: &Request, tx: oneshot::Sender<Outcome>) -> Self {
        match request {
            Request::SendMessage(_) => Self::SendMessage(tx),
            Request::SendMessageAlbum(_) | Request::ForwardMessages(_) => Self::SendMessages(tx),
            _ => Self::Reply(tx),
        }
    }

    fn cancel(self) {
        let (Self::Reply(tx) | Self::SendMessage(tx) | Self::SendMessages(tx)) = self;
        let _ = tx.send(Err(Error::Cancelled));
    }
}

pub(crate) struct Pending {
    pub(crate) continuation: Continuation,
    pub(crate) request: &'static str,
    pub(crate) location: &'static Location<'static>,
}

// ─── Album join ───────────────────────────────────────────────────────────────

/// Joins the sends of several placeholder messages back into one result.
struct AlbumJoin {
    order: Vec<MessageId>,
    total_count: i32,
    state: Mutex<AlbumState>,
}

struct AlbumState {
    sent: HashMap<MessageId, Message>,
    tx: Option<oneshot::Sender<Outcome>>,
}

impl AlbumJoin {
    fn complete(&self, old_id: MessageId, message: Message) {
        let mut state = self.state.lock();
        state.sent.insert(old_id, message);
        if state.sent.len() < self.order.len() {
            return;
        }
        let messages = self.order.iter().filter_map(|id| state.sent.remove(id)).collect();
        if let Some(tx) = state.tx.take() {
            let _ = tx.send(Ok(TdObject::Messages(Messages { total_count: self.total_count, messages })));
        }
    }

    fn fail(&self, error: Error) {
        if let Some(tx) = self.state.lock().tx.take() {
            let _ = tx.send(Err(error));
        }
    }
}

enum MessageWaiter {
    Single(oneshot::Sender<Outcome>),
    Part(Arc<AlbumJoin>),
}

// ─── PendingTable ─────────────────────────────────────────────────────────────

pub(crate) struct PendingTable {
    next_id: AtomicI64,
    requests: DashMap<RequestId, Pending>,
    messages: DashMap<MessageId, MessageWaiter>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self { next_id: AtomicI64::new(1), requests: DashMap::new(), messages: DashMap::new() }
    }

    pub(crate) fn next_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, request_id: RequestId, pending: Pending) {
        self.requests.insert(request_id, pending);
    }

    /// Remove a request that never reached the native client.
    pub(crate) fn forget(&self, request_id: RequestId) {
        self.requests.remove(&request_id);
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len() + self.messages.len()
    }

    /// Resolve the request `request_id`. Returns `false` when nothing was waiting.
    pub(crate) fn resolve(&self, request_id: RequestId, object: TdObject) -> bool {
        let Some((_, pending)) = self.requests.remove(&request_id) else {
            return false;
        };

        let outcome = match object {
            TdObject::Error(e) if e.code == TRANSIENT_ERROR_CODE => {
                tracing::debug!("[tdkit] {} #{request_id} cancelled: {}", pending.request, e.message);
                Err(Error::Cancelled)
            }
            TdObject::Error(e) => Err(Error::Protocol(ProtocolError::from_td(e, pending.request, pending.location))),
            other => Ok(other),
        };

        match pending.continuation {
            Continuation::Reply(tx) => {
                let _ = tx.send(outcome);
            }
            Continuation::SendMessage(tx) => match outcome {
                Ok(TdObject::Message(placeholder)) => {
                    self.messages.insert(placeholder.id, MessageWaiter::Single(tx));
                }
                other => {
                    let _ = tx.send(other.map_err(send_failure));
                }
            },
            Continuation::SendMessages(tx) => match outcome {
                Ok(TdObject::Messages(placeholders)) if !placeholders.messages.is_empty() => {
                    let order: Vec<MessageId> = placeholders.messages.iter().map(|m| m.id).collect();
                    let join = Arc::new(AlbumJoin {
                        order: order.clone(),
                        total_count: placeholders.total_count,
                        state: Mutex::new(AlbumState { sent: HashMap::new(), tx: Some(tx) }),
                    });
                    for id in order {
                        self.messages.insert(id, MessageWaiter::Part(join.clone()));
                    }
                }
                other => {
                    let _ = tx.send(other.map_err(send_failure));
                }
            },
        }
        true
    }

    /// A placeholder message finished sending.
    pub(crate) fn message_sent(&self, old_message_id: MessageId, message: Message) {
        match self.messages.remove(&old_message_id) {
            Some((_, MessageWaiter::Single(tx))) => {
                let _ = tx.send(Ok(TdObject::Message(message)));
            }
            Some((_, MessageWaiter::Part(join))) => join.complete(old_message_id, message),
            None => {}
        }
    }

    /// A placeholder message failed to send.
    pub(crate) fn message_failed(&self, old_message_id: MessageId, error: ProtocolError) {
        match self.messages.remove(&old_message_id) {
            Some((_, MessageWaiter::Single(tx))) => {
                let _ = tx.send(Err(Error::SendMessageFailed(error)));
            }
            Some((_, MessageWaiter::Part(join))) => join.fail(Error::SendMessageFailed(error)),
            None => {}
        }
    }

    /// Resolve everything still waiting as cancelled.
    pub(crate) fn cancel_all(&self) {
        let ids: Vec<RequestId> = self.requests.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, pending)) = self.requests.remove(&id) {
                pending.continuation.cancel();
            }
        }
        let ids: Vec<MessageId> = self.messages.iter().map(|e| *e.key()).collect();
        for id in ids {
            match self.messages.remove(&id) {
                Some((_, MessageWaiter::Single(tx))) => {
                    let _ = tx.send(Err(Error::Cancelled));
                }
                Some((_, MessageWaiter::Part(join))) => join.fail(Error::Cancelled),
                None => {}
            }
        }
    }
}

fn send_failure(error: Error) -> Error {
    match error {
        Error::Protocol(e) => Error::SendMessageFailed(e),
        other => other,
    }
}
