//! The authorization state machine.
//!
//! Authorization states are queued by the receive thread and handled one at
//! a time, in arrival order, by a task owned by the client. Interactive steps
//! ask an [`Authenticator`] for input; a rejected credential is reported back
//! to it and the same prompt is asked again.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use tdkit_bridge::functions::{
    CheckAuthenticationBotToken, CheckAuthenticationCode, CheckAuthenticationPassword, CheckDatabaseEncryptionKey,
    GetMe, RegisterUser, ResendAuthenticationCode, SetAuthenticationPhoneNumber, SetTdlibParameters,
};
use tdkit_bridge::AuthorizationState;

use crate::Client;
use crate::config::LoginType;
use crate::errors::{Error, ProtocolError, Result};

// ─── Authenticator ────────────────────────────────────────────────────────────

/// What the login flow is asking for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompt {
    PhoneNumber,
    BotToken,
    /// Either; input containing `:` is taken as a bot token.
    PhoneNumberOrBotToken,
    /// Login code. `resend` asks for a new one, `reset` goes back to the phone number.
    Code,
    /// Two-step verification password. `reset` goes back to the phone number.
    Password { hint: String },
    /// `first [last]` name for a new account.
    Registration,
}

/// Source of login credentials.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// The next answer to `prompt`, or `None` if there is no more input.
    async fn input(&self, prompt: &Prompt) -> Option<String>;

    /// The answer to `prompt` was rejected; it will be asked again.
    async fn rejected(&self, prompt: &Prompt, error: &ProtocolError) {
        tracing::warn!("[tdkit] {prompt:?} rejected: {error}");
    }

    /// Login waits for confirmation on another device.
    async fn confirm_on_other_device(&self, link: &str) {
        tracing::info!("[tdkit] confirm this login on another device: {link}");
    }
}

/// No interactive input. For bots logging in with a configured token.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInput;

#[async_trait]
impl Authenticator for NoInput {
    async fn input(&self, _prompt: &Prompt) -> Option<String> {
        None
    }
}

/// Answers prompts from a fixed list, in order.
#[derive(Debug, Default)]
pub struct QueuedInput {
    answers: Mutex<VecDeque<String>>,
    rejected: Mutex<Vec<(Prompt, String)>>,
}

impl QueuedInput {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            rejected: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, answer: impl Into<String>) {
        self.answers.lock().push_back(answer.into());
    }

    /// Prompts whose answers were rejected, with the error message.
    pub fn rejections(&self) -> Vec<(Prompt, String)> {
        self.rejected.lock().clone()
    }
}

#[async_trait]
impl Authenticator for QueuedInput {
    async fn input(&self, _prompt: &Prompt) -> Option<String> {
        self.answers.lock().pop_front()
    }

    async fn rejected(&self, prompt: &Prompt, error: &ProtocolError) {
        self.rejected.lock().push((prompt.clone(), error.message.clone()));
    }
}

// ─── State machine ────────────────────────────────────────────────────────────

/// Result of one interactive step.
enum Step {
    Done,
    /// Go back to the phone-number prompt.
    Reset,
}

impl Client {
    /// Handle the authorization states queued for this client, in order.
    pub(crate) async fn run_authorization(&self, mut states: tokio::sync::mpsc::UnboundedReceiver<AuthorizationState>) {
        while let Some(state) = states.recv().await {
            let closed = state == AuthorizationState::Closed;
            match self.on_authorization_state(state).await {
                Ok(()) => {}
                Err(Error::InputExhausted) => {
                    tracing::error!("[{}] Login Failed", self.name());
                    self.inner.login_failed.store(true, Ordering::Release);
                    self.inner.authenticating.set(false);
                    if let Err(e) = self.stop() {
                        tracing::debug!("[{}] stop after failed login: {e}", self.name());
                    }
                }
                Err(Error::Cancelled | Error::ClientClosed) => {}
                Err(e) => self.report_request_error(e.into(), "authorization"),
            }
            if closed {
                break;
            }
        }
    }

    async fn on_authorization_state(&self, state: AuthorizationState) -> Result<()> {
        match state {
            AuthorizationState::WaitTdlibParameters => {
                self.call(SetTdlibParameters { parameters: self.config().parameters.clone() }).await
            }
            AuthorizationState::WaitEncryptionKey { .. } => {
                let encryption_key = self.config().encryption_key.clone().unwrap_or_default();
                self.call(CheckDatabaseEncryptionKey { encryption_key }).await
            }
            AuthorizationState::WaitPhoneNumber => self.login_with_configured_token().await,
            AuthorizationState::WaitCode => self.authenticate(Prompt::Code).await,
            AuthorizationState::WaitPassword { password_hint } => {
                self.authenticate(Prompt::Password { hint: password_hint }).await
            }
            AuthorizationState::WaitRegistration => self.authenticate(Prompt::Registration).await,
            AuthorizationState::WaitOtherDeviceConfirmation { link } => {
                self.config().authenticator.confirm_on_other_device(&link).await;
                Ok(())
            }
            AuthorizationState::Ready => {
                self.on_ready().await;
                Ok(())
            }
            AuthorizationState::LoggingOut => {
                self.on_logging_out().await;
                Ok(())
            }
            AuthorizationState::Closing => {
                tracing::debug!("[{}] closing", self.name());
                Ok(())
            }
            AuthorizationState::Closed => {
                self.on_closed().await;
                Ok(())
            }
            AuthorizationState::Unsupported => Ok(()),
        }
    }

    async fn login_with_configured_token(&self) -> Result<()> {
        let config = self.config();
        if let Some(token) = config.bot_token.clone().filter(|_| config.login_type != LoginType::User) {
            match self.call(CheckAuthenticationBotToken { token }).await {
                Ok(()) => return Ok(()),
                Err(Error::Protocol(e)) => {
                    tracing::warn!("[{}] configured bot token rejected: {e}", self.name());
                }
                Err(e) => return Err(e),
            }
        }
        self.authenticate(self.phone_prompt()).await
    }

    fn phone_prompt(&self) -> Prompt {
        match self.config().login_type {
            LoginType::All  => Prompt::PhoneNumberOrBotToken,
            LoginType::User => Prompt::PhoneNumber,
            LoginType::Bot  => Prompt::BotToken,
        }
    }

    /// Run `prompt`, going back to the phone-number prompt on `reset`.
    async fn authenticate(&self, mut prompt: Prompt) -> Result<()> {
        loop {
            match self.prompt_until_accepted(&prompt).await? {
                Step::Done => return Ok(()),
                Step::Reset => prompt = self.phone_prompt(),
            }
        }
    }

    async fn prompt_until_accepted(&self, prompt: &Prompt) -> Result<Step> {
        let authenticator = self.config().authenticator.clone();
        loop {
            let input = tokio::select! {
                biased;
                _ = self.inner.stopping.cancelled() => return Ok(Step::Done),
                input = authenticator.input(prompt) => input.ok_or(Error::InputExhausted)?,
            };
            let input = input.trim().to_owned();
            let resend = matches!(prompt, Prompt::Code) && input == "resend";

            let result = match (prompt, input.as_str()) {
                (Prompt::Code | Prompt::Password { .. }, "reset") => return Ok(Step::Reset),
                (Prompt::Code, "resend") => self.call(ResendAuthenticationCode {}).await,
                (Prompt::Code, _) => self.call(CheckAuthenticationCode { code: input }).await,
                (Prompt::Password { .. }, _) => self.call(CheckAuthenticationPassword { password: input }).await,
                (Prompt::Registration, _) => {
                    let (first_name, last_name) = match input.split_once(' ') {
                        Some((first, last)) => (first.to_owned(), last.trim().to_owned()),
                        None => (input, String::new()),
                    };
                    self.call(RegisterUser { first_name, last_name }).await
                }
                (Prompt::BotToken, _) => self.call(CheckAuthenticationBotToken { token: input }).await,
                (Prompt::PhoneNumberOrBotToken, _) if input.contains(':') => {
                    self.call(CheckAuthenticationBotToken { token: input }).await
                }
                (Prompt::PhoneNumber | Prompt::PhoneNumberOrBotToken, _) => {
                    self.call(SetAuthenticationPhoneNumber { phone_number: input }).await
                }
            };

            match result {
                Ok(()) if resend => tracing::info!("[{}] login code resent", self.name()),
                Ok(()) => return Ok(Step::Done),
                Err(Error::Protocol(e)) => authenticator.rejected(prompt, &e).await,
                Err(e) => return Err(e),
            }
        }
    }

    async fn on_ready(&self) {
        match self.call(GetMe {}).await {
            Ok(me) => *self.inner.me.write() = Some(me),
            Err(e) => self.report_request_error(e.into(), "getMe"),
        }

        for handler in self.handlers() {
            if let Err(e) = handler.before_login(self).await {
                self.report_request_error(e, "before_login");
            }
        }

        self.inner.authenticating.set(false);
        self.inner.authenticated.set(true);

        for handler in self.handlers() {
            if let Err(e) = handler.on_login(self).await {
                self.report_request_error(e, "on_login");
            }
        }

        match self.me() {
            Some(me) => tracing::info!("[{}] Login {} ( {} @{} )", self.name(), me.display_name(), me.id, me.username),
            None => tracing::info!("[{}] Login", self.name()),
        }
    }

    async fn on_logging_out(&self) {
        self.inner.authenticating.set(false);
        self.inner.authenticated.set(false);
        for handler in self.handlers() {
            if let Err(e) = handler.on_logout(self).await {
                self.report_request_error(e, "on_logout");
            }
        }
        tracing::info!("[{}] Logged out", self.name());
    }

    async fn on_closed(&self) {
        self.inner.authenticating.set(false);
        self.inner.authenticated.set(false);
        self.inner.closed.set(true);
        self.inner.stopping.cancel();
        self.inner.pending.cancel_all();

        if let Err(e) = self.save_cache().await {
            self.report_request_error(e, "save_cache");
        }
        for handler in self.handlers() {
            if let Err(e) = handler.on_destroy(self).await {
                self.report_request_error(e, "on_destroy");
            }
        }

        self.inner.maintenance.cancel();
        self.runtime().unregister(self.id());
        tracing::info!("[{}] Closed", self.name());
    }
}
