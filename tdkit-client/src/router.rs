//! Message routing: conversation state, commands, start payloads and the
//! launch fallback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tdkit_bridge::Message;

use crate::Client;
use crate::command::{Command, StartPayload};
use crate::handler::{Flow, Handler, HandlerResult, MessageContext};
use crate::persist::Persist;

/// Built-in routing for one new message.
pub(crate) async fn handle_new_message(client: &Client, message: Message) -> HandlerResult {
    let ctx = MessageContext::new(message);

    // Waits out an in-flight login before deciding.
    if !client.wait_for_auth().await.unwrap_or(false) {
        tracing::trace!("[{}] message {} dropped: not logged in", client.name(), ctx.message.id);
        return Ok(Flow::Stop);
    }
    if client.config().skip_self_message && ctx.user_id == client.me_id() && !ctx.message.is_service() {
        return Ok(Flow::Stop);
    }
    if client.is_blocked(ctx.user_id) {
        return Ok(Flow::Stop);
    }

    for handler in client.handlers() {
        let flow = handler.on_new_message(client, &ctx).await?;
        if flow.is_stop() {
            return Ok(flow);
        }
    }

    let command = ctx.message.text().and_then(|text| {
        let me = client.me();
        Command::parse(text, &client.config().command_prefixes, me.as_ref().map(|u| u.username.as_str()))
    });

    route(client, &ctx, command.as_ref()).await
}

fn route<'a>(
    client: &'a Client,
    ctx: &'a MessageContext,
    command: Option<&'a Command>,
) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>> {
    Box::pin(async move {
        let persist = if ctx.is_private() { client.read_persist(ctx.user_id) } else { None };

        let Some(persist) = persist else {
            return match command {
                Some(command) => dispatch_command(client, ctx, command).await,
                None if ctx.is_private() => launch(client, ctx).await,
                None => Ok(Flow::Continue),
            };
        };

        let Some(owner) = client.persist_handler(persist.persist_id) else {
            client.remove_persist(ctx.user_id);
            client
                .warn_user_called(ctx.user_id, format!("message in undefined persist {}", persist.persist_id))
                .await;
            // The state is gone, so this recursion reads none and cannot repeat.
            return route(client, ctx, command).await;
        };

        let Some(command) = command else {
            client.user_called(ctx.user_id, format!("message in persist {}/{}", persist.persist_id, persist.sub_id));
            return Ok(owner.on_persist_message(client, ctx, &persist).await?.consumed());
        };

        if command.name == "cancel" && persist.allow_cancel {
            client.user_called(ctx.user_id, format!("cancel persist {}", persist.persist_id));
            cancel(client, ctx, &owner, &persist).await?;
            return Ok(Flow::Stop);
        }

        if persist.allow_function {
            client.user_called(ctx.user_id, format!("function /{} in persist {}", command.name, persist.persist_id));
            return Ok(owner.on_persist_function(client, ctx, &persist, command).await?.consumed());
        }

        if persist.allow_cancel {
            client.user_called(ctx.user_id, format!("function /{} cancels persist {}", command.name, persist.persist_id));
            cancel(client, ctx, &owner, &persist).await?;
            return dispatch_command(client, ctx, command).await;
        }

        Ok(owner.on_persist_message(client, ctx, &persist).await?.consumed())
    })
}

/// Clear the user's state and run the owner's cancel hooks.
async fn cancel(client: &Client, ctx: &MessageContext, owner: &Arc<dyn Handler>, persist: &Persist) -> anyhow::Result<()> {
    client.remove_persist(ctx.user_id);
    owner.on_persist_cancel(client, ctx, persist).await?;
    owner.on_persist_remove_or_cancel(client, ctx.user_id, ctx.chat_id, persist).await?;
    owner.on_send_canceled_message(client, ctx.user_id, ctx.chat_id).await?;
    Ok(())
}

async fn dispatch_command(client: &Client, ctx: &MessageContext, command: &Command) -> HandlerResult {
    if command.name == "start" {
        let Some(payload) = StartPayload::parse(command) else {
            client.user_called(ctx.user_id, "launch");
            return launch(client, ctx).await;
        };

        if let Some(handler) = client.payload_handler(&payload.payload) {
            client.user_called(ctx.user_id, format!("payload {}", payload.payload));
            return Ok(handler.on_start_payload(client, ctx, &payload).await?.consumed());
        }

        client.user_called(ctx.user_id, format!("undefined payload {}", payload.param));
        for handler in client.handlers() {
            let flow = handler.on_undefined_payload(client, ctx, &payload).await?;
            if flow.is_stop() {
                return Ok(flow);
            }
        }
        return if ctx.is_private() { launch(client, ctx).await } else { Ok(Flow::Stop) };
    }

    if let Some(handler) = client.function_handler(&command.name) {
        client.user_called(ctx.user_id, format!("function /{}", command.name));
        return Ok(handler.on_function(client, ctx, command).await?.consumed());
    }

    for handler in client.handlers() {
        let flow = handler.on_undefined_function(client, ctx, command).await?;
        if flow.is_stop() {
            return Ok(flow);
        }
    }

    if command.name == "cancel" {
        if ctx.is_private() {
            if let Some(text) = client.config().nothing_to_cancel_text.clone() {
                client.send_text(ctx.chat_id, text).await?;
            }
        }
        Ok(Flow::Stop)
    } else if ctx.is_private() {
        launch(client, ctx).await
    } else {
        Ok(Flow::Stop)
    }
}

/// Every handler's `on_launch` until one stops.
async fn launch(client: &Client, ctx: &MessageContext) -> HandlerResult {
    for handler in client.handlers() {
        let flow = handler.on_launch(client, ctx).await?;
        if flow.is_stop() {
            return Ok(flow);
        }
    }
    Ok(Flow::Stop)
}
