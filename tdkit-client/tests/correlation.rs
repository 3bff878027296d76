mod common;

use common::*;
use tdkit_client::tdkit_bridge::{
    ForwardMessages, GetUser, Reply, Request, SendMessage, TdError, TdObject, Update,
};
use tdkit_client::{ClientConfig, Error};

fn error(code: i32, message: &str) -> Vec<Reply> {
    vec![Reply::Result(TdObject::Error(TdError { code, message: message.into() }))]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn call_resolves_with_typed_result() {
    let h = Harness::new(ClientConfig::default());
    h.login().await;

    let user = h.client.get_user(ALICE).await.unwrap();
    assert_eq!(user.id, ALICE);
    assert_eq!(user.first_name, "User42");
    assert_eq!(h.client.pending_requests(), 0, "resolved requests must be forgotten");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_calls_each_get_their_own_result() {
    let h = Harness::new(ClientConfig::default());
    h.login().await;

    let calls: Vec<_> = (1..=20).map(|id| h.client.call(GetUser { user_id: id })).collect();
    for (expected, call) in (1..=20).zip(calls) {
        assert_eq!(call.await.unwrap().id, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn protocol_error_points_at_the_call_site() {
    let h = Harness::with_override(ClientConfig::default(), |request| match request {
        Request::GetUser(get) if get.user_id == 7 => Some(error(400, "USER_ID_INVALID")),
        _ => None,
    });
    h.login().await;

    let err = h.client.call(GetUser { user_id: 7 }).await.unwrap_err();
    assert!(err.is("USER_ID_*"));
    let protocol = err.protocol().unwrap();
    assert_eq!(protocol.code, 400);
    assert_eq!(protocol.request, "getUser");
    let location = protocol.location.expect("call site is recorded");
    assert!(location.file().ends_with("correlation.rs"), "got {}", location.file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn code_500_resolves_as_cancelled() {
    let h = Harness::with_override(ClientConfig::default(), |request| match request {
        Request::GetUser(get) if get.user_id == 9 => Some(error(500, "Request aborted")),
        _ => None,
    });
    h.login().await;

    let err = h.client.get_user(9).await.unwrap_err();
    assert!(err.is_cancelled(), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unexpected_result_type_is_reported() {
    let h = Harness::with_override(ClientConfig::default(), |request| match request {
        Request::GetUser(get) if get.user_id == 8 => Some(vec![Reply::Result(TdObject::Ok)]),
        _ => None,
    });
    h.login().await;

    match h.client.get_user(8).await {
        Err(Error::UnexpectedResult { request, expected, got }) => {
            assert_eq!(request, "getUser");
            assert_eq!(expected, "user");
            assert_eq!(got, "ok");
        }
        other => panic!("expected UnexpectedResult, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_message_resolves_with_the_delivered_message() {
    let h = Harness::new(ClientConfig::default());
    h.login().await;

    let sent = h.client.send_text(ALICE, "hello").await.unwrap();
    assert!(sent.id > 0, "placeholder id {} leaked", sent.id);
    assert_eq!(sent.text(), Some("hello"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_delivery_is_an_error() {
    let h = Harness::with_override(ClientConfig::default(), |request| match request {
        Request::SendMessage(send) if send.chat_id == 666 => {
            let placeholder = text_message(-900, ME, 666, "x");
            Some(vec![
                Reply::Result(TdObject::Message(placeholder.clone())),
                Reply::Update(Update::MessageSendFailed {
                    message: placeholder,
                    old_message_id: -900,
                    error_code: 403,
                    error_message: "CHAT_WRITE_FORBIDDEN".into(),
                }),
            ])
        }
        _ => None,
    });
    h.login().await;

    let err = h.client.call(SendMessage::text(666, "x")).await.unwrap_err();
    assert!(matches!(err, Error::SendMessageFailed(_)), "got {err:?}");
    assert!(err.is("CHAT_WRITE_FORBIDDEN"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forward_resolves_in_request_order() {
    let h = Harness::new(ClientConfig::default());
    h.login().await;

    let forwarded = h
        .client
        .call(ForwardMessages {
            chat_id: BOB,
            from_chat_id: ALICE,
            message_ids: vec![11, 12, 13],
            send_copy: false,
            remove_caption: false,
        })
        .await
        .unwrap();

    assert_eq!(forwarded.total_count, 3);
    let ids: Vec<i64> = forwarded.messages.iter().map(|m| m.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "deliveries arrived reversed but results keep request order");
    assert!(ids.iter().all(|id| *id > 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_cancels_outstanding_requests() {
    let h = Harness::with_override(ClientConfig::default(), |request| match request {
        Request::GetUser(get) if get.user_id == 404 => Some(Vec::new()),
        _ => None,
    });
    h.login().await;

    let never = h.client.call(GetUser { user_id: 404 });
    assert_eq!(h.client.pending_requests(), 1);
    h.client.stop().unwrap();

    let err = never.await.unwrap_err();
    assert!(err.is_cancelled(), "got {err:?}");
    h.client.wait_for_close().await;
    assert_eq!(h.client.pending_requests(), 0);

    let err = h.client.get_user(ALICE).await.unwrap_err();
    assert!(matches!(err, Error::ClientClosed), "got {err:?}");
}
