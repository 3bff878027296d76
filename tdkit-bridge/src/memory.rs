//! An in-process [`NativeBridge`] for tests.
//!
//! Submissions are recorded and passed to an optional responder closure which
//! decides what the "native client" answers. Updates can be injected at any
//! time with [`MemoryBridge::push_update`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::functions::Request;
use crate::types::{ClientId, RequestId, TdObject, Update};
use crate::{BridgeError, Event, NativeBridge, UPDATE_REQUEST_ID};

/// What the responder wants delivered for a submitted request.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Result for the submitted request id.
    Result(TdObject),
    /// An unsolicited update for the same client, delivered after any result
    /// that precedes it in the list.
    Update(Update),
}

type Responder = dyn Fn(ClientId, &Request) -> Vec<Reply> + Send + Sync;

/// A request seen by the bridge.
#[derive(Clone, Debug)]
pub struct Submitted {
    pub client_id: ClientId,
    pub request_id: RequestId,
    pub request: Request,
}

pub struct MemoryBridge {
    next_client: AtomicI32,
    queue: Mutex<VecDeque<Event>>,
    ready: Condvar,
    submitted: Mutex<Vec<Submitted>>,
    responder: RwLock<Option<Box<Responder>>>,
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self {
            next_client: AtomicI32::new(1),
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            submitted: Mutex::new(Vec::new()),
            responder: RwLock::new(None),
        }
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(ClientId, &Request) -> Vec<Reply> + Send + Sync + 'static,
    {
        let bridge = Self::new();
        bridge.set_responder(responder);
        bridge
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(ClientId, &Request) -> Vec<Reply> + Send + Sync + 'static,
    {
        *self.responder.write() = Some(Box::new(responder));
    }

    pub fn push_update(&self, client_id: ClientId, update: Update) {
        self.push(Event { client_id, request_id: UPDATE_REQUEST_ID, object: TdObject::Update(update) });
    }

    /// Deliver a result for a request the responder left unanswered.
    pub fn respond(&self, client_id: ClientId, request_id: RequestId, object: TdObject) {
        self.push(Event { client_id, request_id, object });
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.submitted.lock().clone()
    }

    /// The most recent submission matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&Request) -> bool) -> Option<Submitted> {
        self.submitted.lock().iter().rev().find(|s| predicate(&s.request)).cloned()
    }

    fn push(&self, event: Event) {
        self.queue.lock().push_back(event);
        self.ready.notify_one();
    }
}

impl NativeBridge for MemoryBridge {
    fn create_client(&self) -> ClientId {
        self.next_client.fetch_add(1, Ordering::Relaxed)
    }

    fn submit(&self, client_id: ClientId, request_id: RequestId, request: Request) -> Result<(), BridgeError> {
        let replies = match self.responder.read().as_ref() {
            Some(responder) => responder(client_id, &request),
            None => Vec::new(),
        };
        self.submitted.lock().push(Submitted { client_id, request_id, request });

        let mut queue = self.queue.lock();
        for reply in replies {
            queue.push_back(match reply {
                Reply::Result(object) => Event { client_id, request_id, object },
                Reply::Update(update) => Event {
                    client_id,
                    request_id: UPDATE_REQUEST_ID,
                    object: TdObject::Update(update),
                },
            });
        }
        drop(queue);
        self.ready.notify_one();
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> Vec<Event> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            self.ready.wait_for(&mut queue, timeout);
        }
        queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::GetOption;

    #[test]
    fn responder_replies_are_queued_in_order() {
        let bridge = MemoryBridge::with_responder(|_, req| match req {
            Request::GetOption(_) => vec![
                Reply::Result(TdObject::OptionString { value: "1.8.0".into() }),
                Reply::Update(Update::Unsupported),
            ],
            _ => Vec::new(),
        });
        let id = bridge.create_client();
        bridge.submit(id, 5, GetOption { name: "version".into() }.into()).unwrap();

        let events = bridge.poll(Duration::from_millis(1));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].request_id, 5);
        assert!(events[1].is_update());
        assert_eq!(bridge.submitted().len(), 1);
    }

    #[test]
    fn poll_times_out_empty() {
        let bridge = MemoryBridge::new();
        assert!(bridge.poll(Duration::from_millis(5)).is_empty());
    }
}
