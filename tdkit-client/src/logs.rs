//! Log lines naming the user who triggered them.

use std::fmt::Display;

use tdkit_bridge::UserId;
use tracing::Level;

use crate::Client;

impl Client {
    /// Trace `what` as done by this account.
    pub(crate) fn called(&self, what: impl Display) {
        tracing::trace!("[{}] {what}", self.name());
    }

    /// Trace `what` with the user's id. Runs per routed message, so no lookup.
    pub(crate) fn user_called(&self, user_id: UserId, what: impl Display) {
        tracing::trace!("[{}] {what} <- ( {user_id} )", self.name());
    }

    pub(crate) async fn warn_user_called(&self, user_id: UserId, what: impl Display) {
        if !tracing::enabled!(Level::WARN) {
            return;
        }
        let who = self.describe_user(user_id).await;
        tracing::warn!("[{}] {what} <- {who}", self.name());
    }

    async fn describe_user(&self, user_id: UserId) -> String {
        if user_id == 0 {
            return "chat".into();
        }
        match self.get_user(user_id).await {
            Ok(user) if user.username.is_empty() => format!("{} ( {} )", user.display_name(), user.id),
            Ok(user) => format!("{} ( {} @{} )", user.display_name(), user.id, user.username),
            Err(_) => format!("( {user_id} )"),
        }
    }
}
