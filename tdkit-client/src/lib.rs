//! # tdkit-client
//!
//! Async client runtime over a TDLib-style native bridge.
//!
//! ## Features
//! - One receive thread per [`Runtime`], any number of [`Client`]s
//! - Typed request/response correlation with call-site locations on errors
//! - `sendMessage` / albums / forwards resolve with the final sent messages
//! - Authorization state machine with re-prompting on rejected input
//! - Per-sender message ordering and flood control
//! - Command, `/start` payload, callback button and conversation-state routing
//! - Pluggable conversation-state storage and error reporting

#![deny(unsafe_code)]

mod auth;
mod callback;
mod client;
mod command;
mod config;
mod correlation;
mod dispatch;
mod errors;
mod flood;
mod gate;
mod handler;
mod logs;
mod persist;
mod report;
mod router;
mod runtime;

pub use auth::{Authenticator, NoInput, Prompt, QueuedInput};
pub use callback::{MAX_CALLBACK_DATA, NOOP_CALLBACK_ID, decode_callback_data, encode_callback_data};
pub use client::Client;
pub use command::{Command, StartPayload};
pub use config::{ClientConfig, FloodExempt, LoginType, Maintenance, RuntimeConfig};
pub use errors::{Error, ProtocolError, Result, TRANSIENT_ERROR_CODE};
pub use flood::{
    BACKOFF_THRESHOLD, BACKOFF_UNIT, CHAIN_IDLE_TTL, FloodPolicy, MAX_ACTIVE_PER_SENDER, MAX_QUEUED_PER_SENDER, STALE_AFTER,
};
pub use handler::{Flow, Handler, HandlerResult, MessageContext, Registration};
pub use persist::{InMemoryPersistStore, Persist, PersistStore};
pub use report::{ErrorHandler, LogErrors, MAX_REPORTS, ReportToChat};
pub use runtime::Runtime;

pub use tdkit_bridge;
