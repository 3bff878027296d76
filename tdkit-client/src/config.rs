//! Client and runtime configuration.

use std::sync::Arc;
use std::time::Duration;

use tdkit_bridge::{Message, TdlibParameters, UserId};

use crate::auth::{Authenticator, NoInput};
use crate::flood::FloodPolicy;
use crate::persist::{InMemoryPersistStore, PersistStore};
use crate::report::{ErrorHandler, LogErrors};

/// Decides whether a sender bypasses flood control.
pub type FloodExempt = Arc<dyn Fn(UserId, &Message) -> bool + Send + Sync>;

/// Which credentials the login flow asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoginType {
    /// Phone number, or a bot token if the input contains `:`.
    All,
    User,
    #[default]
    Bot,
}

/// Configuration for a [`crate::Client`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Name used in log lines.
    pub name: String,
    pub parameters: TdlibParameters,
    /// Database encryption key; empty when `None`.
    pub encryption_key: Option<Vec<u8>>,
    pub login_type: LoginType,
    /// Tried before prompting when the login type allows bots.
    pub bot_token: Option<String>,
    /// Ignore non-service messages sent by this account.
    pub skip_self_message: bool,
    pub command_prefixes: Vec<String>,
    /// Sent when a dialog is cancelled; `None` sends nothing.
    pub canceled_text: Option<String>,
    /// Sent for `/cancel` without an active dialog; `None` sends nothing.
    pub nothing_to_cancel_text: Option<String>,
    pub flood: FloodPolicy,
    /// Overrides the default exemption (user accounts are exempt, bots are not).
    pub flood_exempt: Option<FloodExempt>,
    pub authenticator: Arc<dyn Authenticator>,
    pub persist_store: Arc<dyn PersistStore>,
    pub error_handler: Arc<dyn ErrorHandler>,
    /// Periodic `save_cache` / `gc`, started with the client; `None` disables it.
    pub maintenance: Option<Maintenance>,
}

/// Schedule for persisting caches and collecting garbage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Maintenance {
    pub save_every: Duration,
    pub gc_every: Duration,
}

impl Default for Maintenance {
    fn default() -> Self {
        Self { save_every: Duration::from_secs(60 * 60), gc_every: Duration::from_secs(24 * 60 * 60) }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "tdkit".into(),
            parameters: TdlibParameters::default(),
            encryption_key: None,
            login_type: LoginType::default(),
            bot_token: None,
            skip_self_message: true,
            command_prefixes: vec!["/".into(), "!".into()],
            canceled_text: Some("Canceled.".into()),
            nothing_to_cancel_text: Some("Nothing to cancel.".into()),
            flood: FloodPolicy::default(),
            flood_exempt: None,
            authenticator: Arc::new(NoInput),
            persist_store: Arc::new(InMemoryPersistStore::new()),
            error_handler: Arc::new(LogErrors),
            maintenance: Some(Maintenance::default()),
        }
    }
}

/// Configuration for a [`crate::Runtime`].
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Longest a single bridge poll blocks; bounds how long shutdown waits
    /// for the receive thread.
    pub poll_timeout: Duration,
    /// Stop every client on Ctrl-C.
    pub shutdown_on_ctrl_c: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { poll_timeout: Duration::from_secs(1), shutdown_on_ctrl_c: false }
    }
}
