//! Objects received from the native client: call results and updates.
//!
//! Only the part of the TDLib schema the runtime routes on is modelled;
//! everything else decodes to an `Unsupported` variant instead of failing.

use serde::{Deserialize, Serialize};

use crate::codec;

pub type ClientId  = i32;
pub type RequestId = i64;
pub type UserId    = i64;
pub type ChatId    = i64;
pub type MessageId = i64;

// ─── Results ──────────────────────────────────────────────────────────────────

/// Any object that can come back as the result of a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum TdObject {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error(TdError),
    #[serde(rename = "optionValueString")]
    OptionString { value: String },
    #[serde(rename = "optionValueInteger")]
    OptionInteger {
        #[serde(with = "codec::int64")]
        value: i64,
    },
    #[serde(rename = "optionValueBoolean")]
    OptionBoolean { value: bool },
    #[serde(rename = "optionValueEmpty")]
    OptionEmpty,
    #[serde(rename = "user")]
    User(User),
    #[serde(rename = "message")]
    Message(Message),
    #[serde(rename = "messages")]
    Messages(Messages),
    /// Unsolicited updates are decoded separately, see [`crate::json::decode_event`].
    #[serde(skip)]
    Update(Update),
    #[serde(other)]
    Unsupported,
}

impl TdObject {
    /// The TDLib type name, for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ok                  => "ok",
            Self::Error(_)            => "error",
            Self::OptionString { .. } => "optionValueString",
            Self::OptionInteger { .. } => "optionValueInteger",
            Self::OptionBoolean { .. } => "optionValueBoolean",
            Self::OptionEmpty         => "optionValueEmpty",
            Self::User(_)             => "user",
            Self::Message(_)          => "message",
            Self::Messages(_)         => "messages",
            Self::Update(u)           => u.type_name(),
            Self::Unsupported         => "unsupported",
        }
    }
}

/// An `error` object. Code 500 means the request became moot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdError {
    pub code: i32,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(rename = "type", default)]
    pub kind: UserType,
}

impl User {
    pub fn is_bot(&self) -> bool {
        matches!(self.kind, UserType::Bot)
    }

    pub fn display_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum UserType {
    #[serde(rename = "userTypeRegular")]
    #[default]
    Regular,
    #[serde(rename = "userTypeBot")]
    Bot,
    #[serde(rename = "userTypeDeleted")]
    Deleted,
    #[serde(other)]
    Unknown,
}

// ─── Messages ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(alias = "sender_id")]
    pub sender: MessageSender,
    pub chat_id: ChatId,
    #[serde(default)]
    pub is_outgoing: bool,
    /// Unix time, seconds.
    pub date: i64,
    pub content: MessageContent,
}

impl Message {
    /// The sending user, if a user (and not a chat or channel) sent it.
    pub fn sender_user_id(&self) -> Option<UserId> {
        match self.sender {
            MessageSender::User { user_id } => Some(user_id),
            MessageSender::Chat { .. }      => None,
        }
    }

    /// Private chats have positive ids.
    pub fn is_private(&self) -> bool {
        self.chat_id > 0
    }

    pub fn is_service(&self) -> bool {
        self.content.is_service()
    }

    /// Text of a text message or caption of a media message.
    pub fn text(&self) -> Option<&str> {
        self.content.text()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum MessageSender {
    #[serde(rename = "messageSenderUser")]
    User { user_id: UserId },
    #[serde(rename = "messageSenderChat")]
    Chat { chat_id: ChatId },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type", rename = "formattedText")]
pub struct FormattedText {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<serde_json::Value>,
}

impl FormattedText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), entities: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum MessageContent {
    #[serde(rename = "messageText")]
    Text { text: FormattedText },
    #[serde(rename = "messagePhoto")]
    Photo { caption: FormattedText },
    #[serde(rename = "messageVideo")]
    Video { caption: FormattedText },
    #[serde(rename = "messageDocument")]
    Document { caption: FormattedText },
    #[serde(rename = "messageAnimation")]
    Animation { caption: FormattedText },
    #[serde(rename = "messageAudio")]
    Audio { caption: FormattedText },
    #[serde(rename = "messageVoiceNote")]
    VoiceNote { caption: FormattedText },
    #[serde(rename = "messageSticker")]
    Sticker,
    #[serde(rename = "messageChatAddMembers")]
    ChatAddMembers { member_user_ids: Vec<UserId> },
    #[serde(rename = "messageChatJoinByLink")]
    ChatJoinByLink,
    #[serde(rename = "messageChatDeleteMember")]
    ChatDeleteMember { user_id: UserId },
    #[serde(rename = "messageChatChangeTitle")]
    ChatChangeTitle { title: String },
    #[serde(rename = "messagePinMessage")]
    PinMessage { message_id: MessageId },
    #[serde(rename = "messageBasicGroupChatCreate")]
    BasicGroupChatCreate,
    #[serde(rename = "messageSupergroupChatCreate")]
    SupergroupChatCreate,
    #[serde(other)]
    Unsupported,
}

impl MessageContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(&text.text),
            Self::Photo { caption }
            | Self::Video { caption }
            | Self::Document { caption }
            | Self::Animation { caption }
            | Self::Audio { caption }
            | Self::VoiceNote { caption } => Some(&caption.text),
            _ => None,
        }
    }

    /// Membership changes, pins, title changes and other chat events.
    pub fn is_service(&self) -> bool {
        matches!(
            self,
            Self::ChatAddMembers { .. }
                | Self::ChatJoinByLink
                | Self::ChatDeleteMember { .. }
                | Self::ChatChangeTitle { .. }
                | Self::PinMessage { .. }
                | Self::BasicGroupChatCreate
                | Self::SupergroupChatCreate
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Messages {
    pub total_count: i32,
    #[serde(deserialize_with = "codec::non_null::deserialize")]
    pub messages: Vec<Message>,
}

// ─── Updates ──────────────────────────────────────────────────────────────────

/// An unsolicited event (request id 0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Update {
    #[serde(rename = "updateAuthorizationState")]
    AuthorizationState { authorization_state: AuthorizationState },
    #[serde(rename = "updateNewMessage")]
    NewMessage { message: Message },
    #[serde(rename = "updateMessageSendAcknowledged")]
    MessageSendAcknowledged { chat_id: ChatId, message_id: MessageId },
    #[serde(rename = "updateMessageSendSucceeded")]
    MessageSendSucceeded { message: Message, old_message_id: MessageId },
    #[serde(rename = "updateMessageSendFailed")]
    MessageSendFailed {
        message: Message,
        old_message_id: MessageId,
        error_code: i32,
        error_message: String,
    },
    #[serde(rename = "updateNewCallbackQuery")]
    NewCallbackQuery(CallbackQuery),
    #[serde(rename = "updateNewInlineCallbackQuery")]
    NewInlineCallbackQuery(InlineCallbackQuery),
    #[serde(rename = "updateConnectionState")]
    ConnectionState { state: ConnectionState },
    #[serde(other)]
    Unsupported,
}

impl Update {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AuthorizationState { .. }      => "updateAuthorizationState",
            Self::NewMessage { .. }              => "updateNewMessage",
            Self::MessageSendAcknowledged { .. } => "updateMessageSendAcknowledged",
            Self::MessageSendSucceeded { .. }    => "updateMessageSendSucceeded",
            Self::MessageSendFailed { .. }       => "updateMessageSendFailed",
            Self::NewCallbackQuery(_)            => "updateNewCallbackQuery",
            Self::NewInlineCallbackQuery(_)      => "updateNewInlineCallbackQuery",
            Self::ConnectionState { .. }         => "updateConnectionState",
            Self::Unsupported                    => "unsupported",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum AuthorizationState {
    #[serde(rename = "authorizationStateWaitTdlibParameters")]
    WaitTdlibParameters,
    #[serde(rename = "authorizationStateWaitEncryptionKey")]
    WaitEncryptionKey {
        #[serde(default)]
        is_encrypted: bool,
    },
    #[serde(rename = "authorizationStateWaitPhoneNumber")]
    WaitPhoneNumber,
    #[serde(rename = "authorizationStateWaitCode")]
    WaitCode,
    #[serde(rename = "authorizationStateWaitOtherDeviceConfirmation")]
    WaitOtherDeviceConfirmation { link: String },
    #[serde(rename = "authorizationStateWaitRegistration")]
    WaitRegistration,
    #[serde(rename = "authorizationStateWaitPassword")]
    WaitPassword {
        #[serde(default)]
        password_hint: String,
    },
    #[serde(rename = "authorizationStateReady")]
    Ready,
    #[serde(rename = "authorizationStateLoggingOut")]
    LoggingOut,
    #[serde(rename = "authorizationStateClosing")]
    Closing,
    #[serde(rename = "authorizationStateClosed")]
    Closed,
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ConnectionState {
    #[serde(rename = "connectionStateWaitingForNetwork")]
    WaitingForNetwork,
    #[serde(rename = "connectionStateConnectingToProxy")]
    ConnectingToProxy,
    #[serde(rename = "connectionStateConnecting")]
    Connecting,
    #[serde(rename = "connectionStateUpdating")]
    Updating,
    #[serde(rename = "connectionStateReady")]
    Ready,
    #[serde(other)]
    Unsupported,
}

/// A button press on a message sent by this client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    #[serde(with = "codec::int64")]
    pub id: i64,
    pub sender_user_id: UserId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    #[serde(with = "codec::int64")]
    pub chat_instance: i64,
    pub payload: CallbackQueryPayload,
}

/// A button press on an inline-mode message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InlineCallbackQuery {
    #[serde(with = "codec::int64")]
    pub id: i64,
    pub sender_user_id: UserId,
    pub inline_message_id: String,
    #[serde(with = "codec::int64")]
    pub chat_instance: i64,
    pub payload: CallbackQueryPayload,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum CallbackQueryPayload {
    #[serde(rename = "callbackQueryPayloadData")]
    Data {
        #[serde(with = "codec::bytes")]
        data: Vec<u8>,
    },
    #[serde(rename = "callbackQueryPayloadGame")]
    Game { game_short_name: String },
    #[serde(other)]
    Unsupported,
}

impl CallbackQueryPayload {
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data { data } => Some(data),
            _ => None,
        }
    }
}
