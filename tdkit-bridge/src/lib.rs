//! # tdkit-bridge
//!
//! The contract between `tdkit-client` and the native messaging-protocol
//! client it drives (TDLib or anything that behaves like it).
//!
//! The native side is reached only through [`NativeBridge`]: requests are
//! submitted tagged with a caller-chosen request id, and results come back
//! from [`NativeBridge::poll`] carrying the same id. Unsolicited updates
//! carry request id `0`.
//!
//! Two bridges are provided:
//! * [`JsonBridge`] adapts the raw TDLib JSON interface (`td_json_client`).
//! * [`MemoryBridge`] is an in-process scripted bridge for tests.

#![deny(unsafe_code)]

pub mod codec;
pub mod functions;
pub mod json;
pub mod memory;
pub mod types;

pub use functions::{
    AnswerCallbackQuery, CheckAuthenticationBotToken, CheckAuthenticationCode, CheckAuthenticationPassword,
    CheckDatabaseEncryptionKey, Close, ForwardMessages, FromObject, Function, GetMe, GetOption, GetUser,
    InlineKeyboardButton, InlineKeyboardButtonType, InputMessageContent, LogOut, OptionValue, RegisterUser,
    ReplyMarkup, Request, ResendAuthenticationCode, SendMessage, SendMessageAlbum, SetAuthenticationPhoneNumber,
    SetTdlibParameters, TdlibParameters,
};
pub use json::{JsonBridge, JsonInterface};
pub use memory::{MemoryBridge, Reply};
pub use types::{
    AuthorizationState, CallbackQuery, CallbackQueryPayload, ChatId, ClientId, InlineCallbackQuery,
    Message, MessageContent, MessageId, MessageSender, Messages, RequestId, TdError, TdObject,
    Update, User, UserId,
};

use std::time::Duration;

/// Request id reserved for unsolicited updates.
pub const UPDATE_REQUEST_ID: RequestId = 0;

// ─── Event ────────────────────────────────────────────────────────────────────

/// One object produced by the native client.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub client_id: ClientId,
    pub request_id: RequestId,
    pub object: TdObject,
}

impl Event {
    pub fn is_update(&self) -> bool {
        self.request_id == UPDATE_REQUEST_ID
    }
}

// ─── BridgeError ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("event is missing @client_id")]
    MissingClientId,
    #[error("native client {0} is closed")]
    Closed(ClientId),
}

// ─── NativeBridge ─────────────────────────────────────────────────────────────

/// The native client, reached only through submit/poll.
///
/// `poll` is never called concurrently; `submit` may be called from any thread.
pub trait NativeBridge: Send + Sync + 'static {
    /// Allocate a new native client instance.
    fn create_client(&self) -> ClientId;

    /// Queue a request. The result is delivered later by [`poll`](Self::poll)
    /// under the same `request_id`.
    fn submit(&self, client_id: ClientId, request_id: RequestId, request: Request) -> Result<(), BridgeError>;

    /// Wait up to `timeout` for events and return every event available.
    fn poll(&self, timeout: Duration) -> Vec<Event>;
}
