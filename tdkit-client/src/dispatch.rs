//! Update dispatch: entry point for every unsolicited update.

use std::time::Duration;

use tdkit_bridge::Update;

use crate::errors::ProtocolError;
use crate::handler::Flow;
use crate::{Client, callback, flood, router};

/// Route an update coming off the receive thread.
///
/// Message sends resolve their waiters here, before any handler sees the
/// update. New messages enter flood control; everything else is processed
/// on a worker right away.
pub(crate) fn post_update(client: &Client, update: Update) {
    match update {
        Update::NewMessage { message } => {
            flood::post_message(client, message);
            return;
        }
        Update::MessageSendSucceeded { ref message, old_message_id } => {
            client.inner.pending.message_sent(old_message_id, message.clone());
        }
        Update::MessageSendFailed { old_message_id, error_code, ref error_message, .. } => {
            client
                .inner
                .pending
                .message_failed(old_message_id, ProtocolError::new(error_code, error_message.clone()));
        }
        Update::AuthorizationState { ref authorization_state } => {
            client.enqueue_authorization_state(authorization_state.clone());
        }
        _ => {}
    }

    let worker = client.clone();
    client.spawn(async move {
        process(&worker, update).await;
    });
}

/// Run the built-in routing, then every handler's `on_update` until one stops.
///
/// Returns the delay the sender's next message must wait for.
pub(crate) async fn process(client: &Client, update: Update) -> Duration {
    match route(client, &update).await {
        Ok(Flow::Continue) => {}
        Ok(flow) => return flow.delay(),
        Err(e) => {
            client.config().error_handler.on_update_error(client, &e, &update);
            return Duration::ZERO;
        }
    }

    for handler in client.handlers() {
        match handler.on_update(client, &update).await {
            Ok(Flow::Continue) => {}
            Ok(flow) => return flow.delay(),
            Err(e) => {
                client.config().error_handler.on_update_error(client, &e, &update);
                return Duration::ZERO;
            }
        }
    }

    tracing::trace!("[{}] {} unhandled", client.name(), update.type_name());
    Duration::ZERO
}

async fn route(client: &Client, update: &Update) -> anyhow::Result<Flow> {
    match update {
        Update::NewMessage { message } => router::handle_new_message(client, message.clone()).await,
        Update::NewCallbackQuery(query) => callback::handle_callback_query(client, query).await,
        Update::NewInlineCallbackQuery(query) => callback::handle_inline_callback_query(client, query).await,
        _ => Ok(Flow::Continue),
    }
}
