//! Requests that can be submitted to the native client.
//!
//! Every request is its own struct implementing [`Function`], which ties it to
//! the type of object it returns. [`Request`] is the type-erased form the
//! bridge transports.

use serde::Serialize;

use crate::codec;
use crate::types::{ChatId, FormattedText, Message, MessageId, Messages, TdObject, User, UserId};

// ─── Function trait ───────────────────────────────────────────────────────────

/// A typed request.
pub trait Function: Into<Request> + Send + 'static {
    type Return: FromObject + Send + 'static;
}

/// Conversion from a raw result object into a function's return type.
pub trait FromObject: Sized {
    /// TDLib type name of the expected object, for error messages.
    const TYPE_NAME: &'static str;

    fn from_object(object: TdObject) -> Option<Self>;
}

impl FromObject for () {
    const TYPE_NAME: &'static str = "ok";

    fn from_object(object: TdObject) -> Option<Self> {
        matches!(object, TdObject::Ok).then_some(())
    }
}

impl FromObject for User {
    const TYPE_NAME: &'static str = "user";

    fn from_object(object: TdObject) -> Option<Self> {
        match object {
            TdObject::User(u) => Some(u),
            _ => None,
        }
    }
}

impl FromObject for Message {
    const TYPE_NAME: &'static str = "message";

    fn from_object(object: TdObject) -> Option<Self> {
        match object {
            TdObject::Message(m) => Some(m),
            _ => None,
        }
    }
}

impl FromObject for Messages {
    const TYPE_NAME: &'static str = "messages";

    fn from_object(object: TdObject) -> Option<Self> {
        match object {
            TdObject::Messages(m) => Some(m),
            _ => None,
        }
    }
}

/// Result of `getOption`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Empty,
}

impl FromObject for OptionValue {
    const TYPE_NAME: &'static str = "optionValue";

    fn from_object(object: TdObject) -> Option<Self> {
        match object {
            TdObject::OptionString { value }  => Some(Self::String(value)),
            TdObject::OptionInteger { value } => Some(Self::Integer(value)),
            TdObject::OptionBoolean { value } => Some(Self::Boolean(value)),
            TdObject::OptionEmpty             => Some(Self::Empty),
            _ => None,
        }
    }
}

// ─── Request structs ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GetOption {
    pub name: String,
}

/// Database and application parameters sent once per client start.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "@type", rename = "tdlibParameters")]
pub struct TdlibParameters {
    pub use_test_dc: bool,
    pub database_directory: String,
    pub files_directory: String,
    pub use_file_database: bool,
    pub use_chat_info_database: bool,
    pub use_message_database: bool,
    pub use_secret_chats: bool,
    pub api_id: i32,
    pub api_hash: String,
    pub system_language_code: String,
    pub device_model: String,
    pub system_version: String,
    pub application_version: String,
    pub enable_storage_optimizer: bool,
    pub ignore_file_names: bool,
}

impl Default for TdlibParameters {
    fn default() -> Self {
        Self {
            use_test_dc: false,
            database_directory: "data".into(),
            files_directory: "data/files".into(),
            use_file_database: true,
            use_chat_info_database: true,
            use_message_database: true,
            use_secret_chats: false,
            api_id: 0,
            api_hash: String::new(),
            system_language_code: "en".into(),
            device_model: "tdkit".into(),
            system_version: std::env::consts::OS.into(),
            application_version: env!("CARGO_PKG_VERSION").into(),
            enable_storage_optimizer: true,
            ignore_file_names: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SetTdlibParameters {
    pub parameters: TdlibParameters,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CheckDatabaseEncryptionKey {
    #[serde(with = "codec::bytes")]
    pub encryption_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SetAuthenticationPhoneNumber {
    pub phone_number: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckAuthenticationBotToken {
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckAuthenticationCode {
    pub code: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckAuthenticationPassword {
    pub password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResendAuthenticationCode {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegisterUser {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GetMe {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GetUser {
    pub user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "@type")]
pub enum InputMessageContent {
    #[serde(rename = "inputMessageText")]
    Text {
        text: FormattedText,
        disable_web_page_preview: bool,
        clear_draft: bool,
    },
    /// Re-send an existing message as a copy.
    #[serde(rename = "inputMessageForwarded")]
    Forwarded {
        from_chat_id: ChatId,
        message_id: MessageId,
        in_game_share: bool,
    },
}

impl InputMessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: FormattedText::plain(text),
            disable_web_page_preview: true,
            clear_draft: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "@type")]
pub enum ReplyMarkup {
    #[serde(rename = "replyMarkupInlineKeyboard")]
    InlineKeyboard { rows: Vec<Vec<InlineKeyboardButton>> },
    #[serde(rename = "replyMarkupRemoveKeyboard")]
    RemoveKeyboard { is_personal: bool },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "@type", rename = "inlineKeyboardButton")]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: InlineKeyboardButtonType,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "@type")]
pub enum InlineKeyboardButtonType {
    #[serde(rename = "inlineKeyboardButtonTypeCallback")]
    Callback {
        #[serde(with = "codec::bytes")]
        data: Vec<u8>,
    },
    #[serde(rename = "inlineKeyboardButtonTypeUrl")]
    Url { url: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SendMessage {
    pub chat_id: ChatId,
    pub reply_to_message_id: MessageId,
    pub reply_markup: Option<ReplyMarkup>,
    pub input_message_content: InputMessageContent,
}

impl SendMessage {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            reply_to_message_id: 0,
            reply_markup: None,
            input_message_content: InputMessageContent::text(text),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SendMessageAlbum {
    pub chat_id: ChatId,
    pub reply_to_message_id: MessageId,
    pub input_message_contents: Vec<InputMessageContent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForwardMessages {
    pub chat_id: ChatId,
    pub from_chat_id: ChatId,
    pub message_ids: Vec<MessageId>,
    pub send_copy: bool,
    pub remove_caption: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnswerCallbackQuery {
    #[serde(with = "codec::int64")]
    pub callback_query_id: i64,
    pub text: String,
    pub show_alert: bool,
    pub url: String,
    pub cache_time: i32,
}

impl AnswerCallbackQuery {
    /// Acknowledge the button press without a notification.
    pub fn silent(callback_query_id: i64) -> Self {
        Self { callback_query_id, text: String::new(), show_alert: false, url: String::new(), cache_time: 0 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LogOut {}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Close {}

// ─── Request enum ─────────────────────────────────────────────────────────────

macro_rules! functions {
    ($($name:ident => $ret:ty : $tl:literal),* $(,)?) => {
        /// A type-erased request, serialised with its TDLib `@type`.
        #[derive(Clone, Debug, PartialEq, Serialize)]
        #[serde(tag = "@type")]
        pub enum Request {
            $(
                #[serde(rename = $tl)]
                $name($name),
            )*
        }

        impl Request {
            pub fn type_name(&self) -> &'static str {
                match self {
                    $( Self::$name(_) => $tl, )*
                }
            }
        }

        $(
            impl From<$name> for Request {
                fn from(f: $name) -> Self { Self::$name(f) }
            }

            impl Function for $name {
                type Return = $ret;
            }
        )*
    };
}

functions! {
    GetOption                    => OptionValue : "getOption",
    SetTdlibParameters           => ()          : "setTdlibParameters",
    CheckDatabaseEncryptionKey   => ()          : "checkDatabaseEncryptionKey",
    SetAuthenticationPhoneNumber => ()          : "setAuthenticationPhoneNumber",
    CheckAuthenticationBotToken  => ()          : "checkAuthenticationBotToken",
    CheckAuthenticationCode      => ()          : "checkAuthenticationCode",
    CheckAuthenticationPassword  => ()          : "checkAuthenticationPassword",
    ResendAuthenticationCode     => ()          : "resendAuthenticationCode",
    RegisterUser                 => ()          : "registerUser",
    GetMe                        => User        : "getMe",
    GetUser                      => User        : "getUser",
    SendMessage                  => Message     : "sendMessage",
    SendMessageAlbum             => Messages    : "sendMessageAlbum",
    ForwardMessages              => Messages    : "forwardMessages",
    AnswerCallbackQuery          => ()          : "answerCallbackQuery",
    LogOut                       => ()          : "logOut",
    Close                        => ()          : "close",
}

impl Request {
    /// Requests whose result is a placeholder message that completes later.
    pub fn sends_messages(&self) -> bool {
        matches!(self, Self::SendMessage(_) | Self::SendMessageAlbum(_) | Self::ForwardMessages(_))
    }
}
