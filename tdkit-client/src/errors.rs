//! Error types for tdkit-client.

use std::fmt;
use std::io;
use std::panic::Location;

use tdkit_bridge::{BridgeError, TdError};

/// Error code the native client uses for "the result of this request is moot".
pub const TRANSIENT_ERROR_CODE: i32 = 500;

// ─── ProtocolError ────────────────────────────────────────────────────────────

/// An `error` object returned by the native client for a request.
///
/// Carries the request type and the call site that issued it, so a failure
/// deep inside a handler still points at the line that made the call.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolError {
    pub code: i32,
    pub message: String,
    /// TDLib type name of the failed request.
    pub request: &'static str,
    pub location: Option<&'static Location<'static>>,
}

impl ProtocolError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), request: "", location: None }
    }

    pub(crate) fn from_td(error: TdError, request: &'static str, location: &'static Location<'static>) -> Self {
        Self { code: error.code, message: error.message, request, location: Some(location) }
    }

    /// Match on the error message, with optional wildcard prefix/suffix `'*'`.
    ///
    /// - `err.is("PHONE_CODE_INVALID")`: exact match
    /// - `err.is("PHONE_CODE_*")`: starts-with match
    /// - `err.is("*_INVALID")`: ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.message.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.message.ends_with(suffix)
        } else {
            self.message == pattern
        }
    }

    pub fn is_transient(&self) -> bool {
        self.code == TRANSIENT_ERROR_CODE
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)?;
        if !self.request.is_empty() {
            write!(f, " (in {}", self.request)?;
            if let Some(loc) = self.location {
                write!(f, " called at {loc}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

// ─── Error ────────────────────────────────────────────────────────────────────

/// The error type returned from any `Client` method that talks to the native client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The native client rejected the request.
    #[error("{0}")]
    Protocol(ProtocolError),
    /// A sent message was accepted but failed to deliver.
    #[error("message send failed: {0}")]
    SendMessageFailed(ProtocolError),
    #[error("client is closed")]
    ClientClosed,
    /// The request was cancelled (client closed, or its result became moot).
    #[error("request cancelled")]
    Cancelled,
    #[error("client already started")]
    AlreadyStarted,
    #[error("client not started")]
    NotStarted,
    #[error("unexpected result for {request}: expected {expected}, got {got}")]
    UnexpectedResult {
        request: &'static str,
        expected: &'static str,
        got: &'static str,
    },
    /// The authenticator ran out of input during login.
    #[error("login failed: no more input")]
    InputExhausted,
    #[error("callback data is {0} bytes, the limit is 64")]
    CallbackDataTooLong(usize),
    #[error("malformed callback data")]
    MalformedCallbackData,
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("no tokio runtime is running")]
    NoReactor,
}

impl Error {
    /// Returns `true` if this is the named protocol error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        self.protocol().is_some_and(|e| e.is(pattern))
    }

    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(e) | Self::SendMessageFailed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
