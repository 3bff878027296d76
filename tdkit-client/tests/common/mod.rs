//! Shared harness: a scripted bridge answering like a logged-in bot account.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tdkit_client::tdkit_bridge::types::{FormattedText, UserType};
use tdkit_client::tdkit_bridge::{
    AuthorizationState, CallbackQuery, CallbackQueryPayload, ChatId, InputMessageContent, MemoryBridge, Message,
    MessageContent, MessageSender, Messages, NativeBridge, Reply, Request, TdObject, Update, User, UserId,
};
use tdkit_client::{Client, ClientConfig, Runtime, RuntimeConfig};

pub const ME: UserId = 1000;
pub const ALICE: UserId = 42;
pub const BOB: UserId = 43;
pub const GROUP: ChatId = -100_500;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Answers a request before the default script does. `None` falls through.
pub type Override = dyn Fn(&Request) -> Option<Vec<Reply>> + Send + Sync;

pub struct Harness {
    pub bridge: Arc<MemoryBridge>,
    pub runtime: Runtime,
    pub client: Client,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_override(config, |_| None)
    }

    pub fn with_override(
        config: ClientConfig,
        answer: impl Fn(&Request) -> Option<Vec<Reply>> + Send + Sync + 'static,
    ) -> Self {
        Self::build(config, Arc::new(answer), UserType::Bot)
    }

    /// A harness whose account is a regular user rather than a bot.
    pub fn user_account(config: ClientConfig) -> Self {
        Self::build(config, Arc::new(|_| None), UserType::Regular)
    }

    fn build(config: ClientConfig, answer: Arc<Override>, me_kind: UserType) -> Self {
        let bridge = Arc::new(MemoryBridge::new());
        let next_message = Arc::new(AtomicI64::new(1));
        bridge.set_responder(move |_client, request| {
            answer(request).unwrap_or_else(|| script(request, &next_message, me_kind.clone()))
        });

        let runtime = Runtime::with_config(
            bridge.clone() as Arc<dyn NativeBridge>,
            RuntimeConfig { poll_timeout: Duration::from_millis(20), ..Default::default() },
        )
        .unwrap();
        let client = Client::new(&runtime, ClientConfig { maintenance: None, ..config });
        Self { bridge, runtime, client }
    }

    pub fn push(&self, update: Update) {
        self.bridge.push_update(self.client.id(), update);
    }

    pub fn push_state(&self, state: AuthorizationState) {
        self.push(Update::AuthorizationState { authorization_state: state });
    }

    pub fn push_message(&self, message: Message) {
        self.push(Update::NewMessage { message });
    }

    /// Start the client and log in as the scripted account.
    pub async fn login(&self) {
        self.client.start().unwrap();
        self.push_state(AuthorizationState::Ready);
        tokio::time::timeout(TIMEOUT, self.client.wait_for_login())
            .await
            .expect("login timed out")
            .unwrap();
    }

    /// Every text sent with `sendMessage`, in submission order.
    pub fn sent_texts(&self) -> Vec<(ChatId, String)> {
        self.bridge
            .submitted()
            .into_iter()
            .filter_map(|s| match s.request {
                Request::SendMessage(send) => match send.input_message_content {
                    InputMessageContent::Text { text, .. } => Some((send.chat_id, text.text)),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    pub fn count_submitted(&self, type_name: &str) -> usize {
        self.bridge.submitted().iter().filter(|s| s.request.type_name() == type_name).count()
    }

    pub async fn shutdown(&self) {
        tokio::time::timeout(TIMEOUT, self.runtime.shutdown()).await.expect("shutdown timed out");
    }
}

/// What the native client answers when nothing overrides it.
fn script(request: &Request, next_message: &AtomicI64, me_kind: UserType) -> Vec<Reply> {
    match request {
        Request::GetOption(_) => vec![Reply::Result(TdObject::OptionString { value: "1.8.0".into() })],
        Request::GetMe(_) => vec![Reply::Result(TdObject::User(User {
            id: ME,
            first_name: "Test".into(),
            last_name: "Bot".into(),
            username: "testbot".into(),
            kind: me_kind,
        }))],
        Request::GetUser(get) => vec![Reply::Result(TdObject::User(user(get.user_id)))],
        Request::SendMessage(send) => {
            let text = match &send.input_message_content {
                InputMessageContent::Text { text, .. } => text.text.clone(),
                _ => String::new(),
            };
            let id = next_message.fetch_add(1, Ordering::Relaxed);
            let placeholder = outgoing(-id, send.chat_id, &text);
            let sent = outgoing(id, send.chat_id, &text);
            vec![
                Reply::Result(TdObject::Message(placeholder)),
                Reply::Update(Update::MessageSendSucceeded { message: sent, old_message_id: -id }),
            ]
        }
        Request::ForwardMessages(forward) => {
            let ids: Vec<i64> =
                forward.message_ids.iter().map(|_| next_message.fetch_add(1, Ordering::Relaxed)).collect();
            let placeholders = ids.iter().map(|id| outgoing(-id, forward.chat_id, "")).collect();
            let mut replies = vec![Reply::Result(TdObject::Messages(Messages {
                total_count: ids.len() as i32,
                messages: placeholders,
            }))];
            // Deliveries complete out of order.
            for id in ids.iter().rev() {
                replies.push(Reply::Update(Update::MessageSendSucceeded {
                    message: outgoing(*id, forward.chat_id, ""),
                    old_message_id: -id,
                }));
            }
            replies
        }
        Request::Close(_) => vec![
            Reply::Result(TdObject::Ok),
            Reply::Update(Update::AuthorizationState { authorization_state: AuthorizationState::Closing }),
            Reply::Update(Update::AuthorizationState { authorization_state: AuthorizationState::Closed }),
        ],
        _ => vec![Reply::Result(TdObject::Ok)],
    }
}

pub fn user(id: UserId) -> User {
    User {
        id,
        first_name: format!("User{id}"),
        last_name: String::new(),
        username: String::new(),
        kind: UserType::Regular,
    }
}

fn outgoing(id: i64, chat_id: ChatId, text: &str) -> Message {
    Message {
        id,
        sender: MessageSender::User { user_id: ME },
        chat_id,
        is_outgoing: true,
        date: chrono::Utc::now().timestamp(),
        content: MessageContent::Text { text: FormattedText::plain(text) },
    }
}

pub fn text_message(id: i64, from: UserId, chat_id: ChatId, text: &str) -> Message {
    Message {
        id,
        sender: MessageSender::User { user_id: from },
        chat_id,
        is_outgoing: false,
        date: chrono::Utc::now().timestamp(),
        content: MessageContent::Text { text: FormattedText::plain(text) },
    }
}

/// A message from `from` in their private chat.
pub fn private(id: i64, from: UserId, text: &str) -> Message {
    text_message(id, from, from, text)
}

pub fn callback_query(id: i64, from: UserId, data: Vec<u8>) -> CallbackQuery {
    CallbackQuery {
        id,
        sender_user_id: from,
        chat_id: from,
        message_id: 1,
        chat_instance: 7,
        payload: CallbackQueryPayload::Data { data },
    }
}

/// Ordered record of what handlers saw.
#[derive(Default)]
pub struct Events(Mutex<Vec<String>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.0.lock().iter().any(|e| e == event)
    }
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
