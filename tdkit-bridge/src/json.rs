//! [`NativeBridge`] over the TDLib JSON interface.
//!
//! TDLib's JSON client is three functions: create a client id, send a JSON
//! request to it, and receive the next JSON object for any client. The
//! request id travels in the `@extra` field and the client id in
//! `@client_id`.

use std::time::Duration;

use serde_json::Value;

use crate::functions::Request;
use crate::types::{ClientId, RequestId, TdObject, Update};
use crate::{BridgeError, Event, NativeBridge, UPDATE_REQUEST_ID};

/// Most objects drained by a single [`JsonBridge::poll`].
pub const MAX_EVENTS_PER_POLL: usize = 1000;

/// The raw `td_json_client` functions.
pub trait JsonInterface: Send + Sync + 'static {
    fn create_client_id(&self) -> ClientId;

    fn send(&self, client_id: ClientId, request: &str);

    /// Next object for any client, waiting up to `timeout` seconds.
    fn receive(&self, timeout: f64) -> Option<String>;
}

pub struct JsonBridge<I> {
    interface: I,
    max_events: usize,
}

impl<I: JsonInterface> JsonBridge<I> {
    pub fn new(interface: I) -> Self {
        Self { interface, max_events: MAX_EVENTS_PER_POLL }
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    fn decode(&self, raw: &str) -> Option<Event> {
        match decode_event(raw) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("[tdkit] dropping undecodable object: {e}");
                None
            }
        }
    }
}

impl<I: JsonInterface> NativeBridge for JsonBridge<I> {
    fn create_client(&self) -> ClientId {
        self.interface.create_client_id()
    }

    fn submit(&self, client_id: ClientId, request_id: RequestId, request: Request) -> Result<(), BridgeError> {
        let raw = encode_request(request_id, &request)?;
        self.interface.send(client_id, &raw);
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> Vec<Event> {
        let mut events = Vec::new();
        let Some(first) = self.interface.receive(timeout.as_secs_f64()) else {
            return events;
        };
        events.extend(self.decode(&first));
        while events.len() < self.max_events {
            match self.interface.receive(0.0) {
                Some(raw) => events.extend(self.decode(&raw)),
                None => break,
            }
        }
        events
    }
}

// ─── Encoding ─────────────────────────────────────────────────────────────────

/// Serialise a request with its id in `@extra`.
pub fn encode_request(request_id: RequestId, request: &Request) -> Result<String, BridgeError> {
    let mut value = serde_json::to_value(request).map_err(BridgeError::Encode)?;
    if let Value::Object(map) = &mut value {
        map.insert("@extra".into(), Value::from(request_id));
    }
    serde_json::to_string(&value).map_err(BridgeError::Encode)
}

/// Parse one received object. Objects without `@extra` are updates.
pub fn decode_event(raw: &str) -> Result<Event, BridgeError> {
    let mut value: Value = serde_json::from_str(raw).map_err(BridgeError::Decode)?;
    let map = value.as_object_mut().ok_or(BridgeError::MissingClientId)?;

    let client_id = map
        .remove("@client_id")
        .and_then(|v| v.as_i64())
        .and_then(|v| ClientId::try_from(v).ok())
        .ok_or(BridgeError::MissingClientId)?;
    let request_id = map
        .remove("@extra")
        .and_then(|v| v.as_i64())
        .unwrap_or(UPDATE_REQUEST_ID);

    let is_update = request_id == UPDATE_REQUEST_ID
        && map.get("@type").and_then(Value::as_str).is_some_and(|t| t.starts_with("update"));

    let object = if is_update {
        TdObject::Update(serde_json::from_value::<Update>(value).map_err(BridgeError::Decode)?)
    } else {
        serde_json::from_value::<TdObject>(value).map_err(BridgeError::Decode)?
    };

    Ok(Event { client_id, request_id, object })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{GetOption, SendMessage};
    use crate::types::AuthorizationState;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Scripted {
        sent: Mutex<Vec<(ClientId, String)>>,
        inbox: Mutex<VecDeque<String>>,
    }

    impl JsonInterface for &'static Scripted {
        fn create_client_id(&self) -> ClientId { 1 }
        fn send(&self, client_id: ClientId, request: &str) {
            self.sent.lock().push((client_id, request.to_owned()));
        }
        fn receive(&self, _timeout: f64) -> Option<String> {
            self.inbox.lock().pop_front()
        }
    }

    fn scripted() -> &'static Scripted {
        Box::leak(Box::default())
    }

    #[test]
    fn request_carries_extra_and_type() {
        let raw = encode_request(7, &GetOption { name: "version".into() }.into()).unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["@type"], "getOption");
        assert_eq!(v["@extra"], 7);
        assert_eq!(v["name"], "version");
    }

    #[test]
    fn send_message_content_is_tagged() {
        let raw = encode_request(1, &SendMessage::text(5, "hi").into()).unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["input_message_content"]["@type"], "inputMessageText");
        assert_eq!(v["input_message_content"]["text"]["@type"], "formattedText");
        assert_eq!(v["input_message_content"]["text"]["text"], "hi");
    }

    #[test]
    fn updates_and_results_are_told_apart() {
        let update = decode_event(
            r#"{"@type":"updateAuthorizationState","@client_id":1,
                "authorization_state":{"@type":"authorizationStateWaitTdlibParameters"}}"#,
        )
        .unwrap();
        assert!(update.is_update());
        assert_eq!(
            update.object,
            TdObject::Update(Update::AuthorizationState {
                authorization_state: AuthorizationState::WaitTdlibParameters
            })
        );

        let error = decode_event(r#"{"@type":"error","@client_id":1,"@extra":3,"code":400,"message":"BAD"}"#).unwrap();
        assert_eq!(error.request_id, 3);
        assert!(matches!(error.object, TdObject::Error(ref e) if e.code == 400 && e.message == "BAD"));
    }

    #[test]
    fn unknown_types_decode_as_unsupported() {
        let e = decode_event(r#"{"@type":"updateChatTitle","@client_id":2,"chat_id":1,"title":"x"}"#).unwrap();
        assert_eq!(e.object, TdObject::Update(Update::Unsupported));
        let e = decode_event(r#"{"@type":"chats","@client_id":2,"@extra":9,"total_count":0,"chat_ids":[]}"#).unwrap();
        assert_eq!(e.object, TdObject::Unsupported);
    }

    #[test]
    fn missing_client_id_is_an_error() {
        assert!(matches!(decode_event(r#"{"@type":"ok","@extra":1}"#), Err(BridgeError::MissingClientId)));
    }

    #[test]
    fn poll_drains_up_to_batch_size() {
        let iface = scripted();
        for i in 1..=5 {
            iface.inbox.lock().push_back(format!(r#"{{"@type":"ok","@client_id":1,"@extra":{i}}}"#));
        }
        iface.inbox.lock().push_back("not json".into());
        let bridge = JsonBridge::new(iface).with_max_events(3);

        let first = bridge.poll(Duration::from_millis(10));
        assert_eq!(first.iter().map(|e| e.request_id).collect::<Vec<_>>(), vec![1, 2, 3]);

        // The malformed object is skipped, not returned.
        let second = bridge.poll(Duration::from_millis(10));
        assert_eq!(second.iter().map(|e| e.request_id).collect::<Vec<_>>(), vec![4, 5]);
        assert!(bridge.poll(Duration::from_millis(10)).is_empty());
    }

    #[test]
    fn submit_forwards_to_interface() {
        let iface = scripted();
        let bridge = JsonBridge::new(iface);
        bridge.submit(4, 11, GetOption { name: "version".into() }.into()).unwrap();
        let sent = iface.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 4);
        assert!(sent[0].1.contains(r#""@extra":11"#));
    }
}
