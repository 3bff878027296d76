mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use tdkit_client::{Client, ClientConfig, Command, Flow, Handler, HandlerResult, MessageContext, Registration};

#[derive(Default)]
struct Ping {
    events: Events,
}

#[async_trait]
impl Handler for Ping {
    fn registration(&self) -> Registration {
        Registration::new().function("ping")
    }

    async fn on_function(&self, _client: &Client, _ctx: &MessageContext, command: &Command) -> HandlerResult {
        self.events.push(command.name.clone());
        Ok(Flow::Stop)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trace_logging_does_not_fetch_senders() {
    let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::TRACE).with_test_writer().try_init();
    assert!(tracing::enabled!(tracing::Level::TRACE));

    let h = Harness::new(ClientConfig::default());
    let ping = Arc::new(Ping::default());
    h.client.add_handler(ping.clone()).await.unwrap();
    h.login().await;

    for n in 0..5 {
        h.push_message(private(n, ALICE, "/ping"));
    }
    eventually("every ping", || ping.events.len() == 5).await;
    assert_eq!(h.count_submitted("getUser"), 0);
}
