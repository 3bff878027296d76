mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use tdkit_client::tdkit_bridge::UserId;
use tdkit_client::tdkit_bridge::Message;
use tdkit_client::{Client, ClientConfig, Flow, FloodPolicy, Handler, HandlerResult, MessageContext};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Records message text per sender, sleeping longer for earlier messages.
#[derive(Default)]
struct Slow {
    events: Events,
}

#[async_trait]
impl Handler for Slow {
    async fn on_new_message(&self, _client: &Client, ctx: &MessageContext) -> HandlerResult {
        let text = ctx.message.text().unwrap_or_default().to_owned();
        let n: u64 = text.rsplit(' ').next().and_then(|n| n.parse().ok()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(n))).await;
        self.events.push(text);
        Ok(Flow::Stop)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_sender_is_handled_in_order() {
    let h = Harness::new(ClientConfig::default());
    let slow = Arc::new(Slow::default());
    h.client.add_handler(slow.clone()).await.unwrap();
    h.login().await;

    for n in 0..10 {
        h.push_message(private(n, ALICE, &format!("alice {n}")));
        h.push_message(private(100 + n, BOB, &format!("bob {n}")));
    }
    eventually("all handled", || slow.events.len() == 20).await;

    let events = slow.events.snapshot();
    for who in ["alice", "bob"] {
        let seen: Vec<&String> = events.iter().filter(|e| e.starts_with(who)).collect();
        let expected: Vec<String> = (0..10).map(|n| format!("{who} {n}")).collect();
        assert_eq!(seen, expected.iter().collect::<Vec<_>>());
    }
}

/// Holds every message until released.
#[derive(Default)]
struct Stuck {
    release: Notify,
    entered: AtomicUsize,
    dropped: Events,
}

#[async_trait]
impl Handler for Stuck {
    async fn on_new_message(&self, _client: &Client, _ctx: &MessageContext) -> HandlerResult {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(Flow::Stop)
    }

    async fn on_sender_dropped(&self, _client: &Client, user_id: UserId) -> anyhow::Result<()> {
        self.dropped.push(user_id.to_string());
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sender_over_the_limit_is_dropped_once() {
    let h = Harness::new(ClientConfig::default());
    let stuck = Arc::new(Stuck::default());
    h.client.add_handler(stuck.clone()).await.unwrap();
    h.login().await;

    for n in 0..110 {
        h.push_message(private(n, ALICE, "spam"));
    }
    eventually("drop notification", || stuck.dropped.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(stuck.dropped.snapshot(), ["42"]);
    assert_eq!(stuck.entered.load(Ordering::SeqCst), 1, "later messages wait behind the first");

    // Further messages from a dropped sender are ignored without a new notification.
    h.push_message(private(500, ALICE, "more spam"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stuck.dropped.len(), 1);

    // Other senders are unaffected.
    h.push_message(private(600, BOB, "hi"));
    eventually("bob handled", || stuck.entered.load(Ordering::SeqCst) == 2).await;
}

/// Push a burst of 105 held messages and release them one by one.
async fn burst_is_never_dropped(h: &Harness, stuck: &Stuck) {
    for n in 0..105 {
        h.push_message(private(n, ALICE, "burst"));
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stuck.dropped.len(), 0);
    assert_eq!(stuck.entered.load(Ordering::SeqCst), 1, "exempt senders stay ordered");

    eventually("burst drained", || {
        stuck.release.notify_one();
        stuck.entered.load(Ordering::SeqCst) == 105
    })
    .await;
    assert_eq!(stuck.dropped.len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exempt_senders_are_ordered_but_never_dropped() {
    let config = ClientConfig {
        flood_exempt: Some(Arc::new(|sender, _message| sender == ALICE)),
        ..Default::default()
    };
    let h = Harness::new(config);
    let stuck = Arc::new(Stuck::default());
    h.client.add_handler(stuck.clone()).await.unwrap();
    h.login().await;

    burst_is_never_dropped(&h, &stuck).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn user_accounts_do_not_rate_limit() {
    let h = Harness::user_account(ClientConfig::default());
    let stuck = Arc::new(Stuck::default());
    h.client.add_handler(stuck.clone()).await.unwrap();
    h.login().await;

    burst_is_never_dropped(&h, &stuck).await;
}

/// Asks for a pause after the first message.
#[derive(Default)]
struct Pacing {
    started: parking_lot::Mutex<Vec<Instant>>,
}

#[async_trait]
impl Handler for Pacing {
    async fn on_new_message(&self, _client: &Client, _ctx: &MessageContext) -> HandlerResult {
        let mut started = self.started.lock();
        started.push(Instant::now());
        Ok(if started.len() == 1 { Flow::StopWithDelay(Duration::from_millis(300)) } else { Flow::Stop })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn requested_delay_holds_back_the_next_message() {
    let h = Harness::new(ClientConfig::default());
    let pacing = Arc::new(Pacing::default());
    h.client.add_handler(pacing.clone()).await.unwrap();
    h.login().await;

    h.push_message(private(1, ALICE, "one"));
    h.push_message(private(2, ALICE, "two"));
    eventually("both handled", || pacing.started.lock().len() == 2).await;

    let started = pacing.started.lock().clone();
    assert!(started[1] - started[0] >= Duration::from_millis(300), "gap {:?}", started[1] - started[0]);
}

/// Records when each message starts and every drop notification.
#[derive(Default)]
struct Timed {
    started: parking_lot::Mutex<Vec<Instant>>,
    dropped: Events,
}

#[async_trait]
impl Handler for Timed {
    async fn on_new_message(&self, _client: &Client, _ctx: &MessageContext) -> HandlerResult {
        self.started.lock().push(Instant::now());
        Ok(Flow::Stop)
    }

    async fn on_sender_dropped(&self, _client: &Client, user_id: UserId) -> anyhow::Result<()> {
        self.dropped.push(user_id.to_string());
        Ok(())
    }
}

impl Timed {
    fn handled(&self) -> usize {
        self.started.lock().len()
    }
}

async fn with_policy(flood: FloodPolicy) -> (Harness, Arc<Timed>) {
    let h = Harness::new(ClientConfig { flood, ..Default::default() });
    let timed = Arc::new(Timed::default());
    h.client.add_handler(timed.clone()).await.unwrap();
    h.login().await;
    (h, timed)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn long_chain_is_dropped_once_even_when_idle() {
    let (h, timed) = with_policy(FloodPolicy { max_queued: 3, backoff_threshold: 1000, ..Default::default() }).await;

    // Each message finishes before the next arrives, so only the chain length grows.
    for n in 0..4 {
        h.push_message(private(n, ALICE, "one at a time"));
        eventually("handled", || timed.handled() == n as usize + 1).await;
    }
    for n in 4..8 {
        h.push_message(private(n, ALICE, "over the limit"));
    }
    eventually("drop notification", || timed.dropped.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(timed.handled(), 4);
    assert_eq!(timed.dropped.snapshot(), ["42"]);

    h.push_message(private(100, BOB, "hi"));
    eventually("bob handled", || timed.handled() == 5).await;
    assert_eq!(timed.dropped.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn long_chains_back_off_per_queued_message() {
    let unit = Duration::from_millis(100);
    let (h, timed) = with_policy(FloodPolicy { backoff_threshold: 2, backoff_unit: unit, ..Default::default() }).await;

    for n in 0..4 {
        h.push_message(private(n, ALICE, "queued"));
    }
    eventually("all handled", || timed.handled() == 4).await;

    let started = timed.started.lock().clone();
    // The fourth message sees three predecessors.
    let gap = started[3] - started[2];
    assert!(gap >= unit * 3, "gap {gap:?}");
    assert!(started[2] - started[0] < unit * 3, "early messages are not delayed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_message_skips_the_queue() {
    let h = Harness::new(ClientConfig::default());
    let stuck = Arc::new(Stuck::default());
    h.client.add_handler(stuck.clone()).await.unwrap();
    h.login().await;

    h.push_message(private(1, ALICE, "fresh"));
    eventually("first held", || stuck.entered.load(Ordering::SeqCst) == 1).await;

    let old = Message { date: chrono::Utc::now().timestamp() - 60, ..private(2, ALICE, "old") };
    h.push_message(old);
    eventually("stale message runs beside the held one", || stuck.entered.load(Ordering::SeqCst) == 2).await;

    stuck.release.notify_waiters();
}
