//! Inline-button payloads and callback-query routing.
//!
//! A button's data is a sequence of fields, each prefixed by its length in
//! one byte. The first field is always the 4-byte big-endian registration id
//! of the handler that owns the button.

use tdkit_bridge::{AnswerCallbackQuery, CallbackQuery, InlineCallbackQuery};

use crate::Client;
use crate::errors::{Error, Result};
use crate::handler::{Flow, HandlerResult};

/// Buttons carrying this id are acknowledged and otherwise ignored.
pub const NOOP_CALLBACK_ID: i32 = -1;

/// Limit on callback data imposed by the servers.
pub const MAX_CALLBACK_DATA: usize = 64;

/// Build the payload for a button owned by callback `id`.
pub fn encode_callback_data(id: i32, fields: &[&[u8]]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(MAX_CALLBACK_DATA);
    out.push(4);
    out.extend_from_slice(&id.to_be_bytes());
    for field in fields {
        let len = u8::try_from(field.len()).map_err(|_| Error::CallbackDataTooLong(field.len()))?;
        out.push(len);
        out.extend_from_slice(field);
    }
    if out.len() > MAX_CALLBACK_DATA {
        return Err(Error::CallbackDataTooLong(out.len()));
    }
    Ok(out)
}

/// Split a payload into its registration id and remaining fields.
pub fn decode_callback_data(data: &[u8]) -> Result<(i32, Vec<Vec<u8>>)> {
    let mut fields = Vec::new();
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = len as usize;
        if tail.len() < len {
            return Err(Error::MalformedCallbackData);
        }
        let (field, tail) = tail.split_at(len);
        fields.push(field.to_vec());
        rest = tail;
    }

    if fields.is_empty() {
        return Err(Error::MalformedCallbackData);
    }
    let head = fields.remove(0);
    let id: [u8; 4] = head.as_slice().try_into().map_err(|_| Error::MalformedCallbackData)?;
    Ok((i32::from_be_bytes(id), fields))
}

async fn accepts(client: &Client, user_id: i64) -> bool {
    client.wait_for_auth().await.unwrap_or(false) && !client.is_blocked(user_id)
}

pub(crate) async fn handle_callback_query(client: &Client, query: &CallbackQuery) -> HandlerResult {
    if !accepts(client, query.sender_user_id).await {
        return Ok(Flow::Stop);
    }
    let Some((id, fields)) = decode(client, query.payload.data()) else {
        return Ok(Flow::Continue);
    };

    if id == NOOP_CALLBACK_ID {
        client.call(AnswerCallbackQuery::silent(query.id)).await?;
        return Ok(Flow::Stop);
    }

    let Some(handler) = client.callback_handler(id) else {
        client.warn_user_called(query.sender_user_id, format!("undefined callback {id}")).await;
        return Ok(Flow::Stop);
    };
    client.user_called(query.sender_user_id, format!("callback {id}"));
    Ok(handler.on_callback_query(client, query, &fields).await?.consumed())
}

pub(crate) async fn handle_inline_callback_query(client: &Client, query: &InlineCallbackQuery) -> HandlerResult {
    if !accepts(client, query.sender_user_id).await {
        return Ok(Flow::Stop);
    }
    let Some((id, fields)) = decode(client, query.payload.data()) else {
        return Ok(Flow::Continue);
    };

    if id == NOOP_CALLBACK_ID {
        client.call(AnswerCallbackQuery::silent(query.id)).await?;
        return Ok(Flow::Stop);
    }

    let Some(handler) = client.callback_handler(id) else {
        client.warn_user_called(query.sender_user_id, format!("undefined inline callback {id}")).await;
        return Ok(Flow::Stop);
    };
    client.user_called(query.sender_user_id, format!("inline callback {id}"));
    Ok(handler.on_inline_callback_query(client, query, &fields).await?.consumed())
}

fn decode(client: &Client, data: Option<&[u8]>) -> Option<(i32, Vec<Vec<u8>>)> {
    match decode_callback_data(data?) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::trace!("[{}] ignoring callback payload: {e}", client.name());
            None
        }
    }
}
