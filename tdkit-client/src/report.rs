//! Where errors from handlers and background flows end up.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use tdkit_bridge::{ChatId, Update};

use crate::Client;

/// Receives errors caught at the dispatch boundary.
pub trait ErrorHandler: Send + Sync {
    /// A handler hook failed while processing `update`.
    fn on_update_error(&self, client: &Client, error: &anyhow::Error, update: &Update);

    /// A background request flow failed (authorization, maintenance, notifications).
    fn on_request_error(&self, client: &Client, error: &anyhow::Error, context: &str);
}

/// Logs every error. The default.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrors;

impl ErrorHandler for LogErrors {
    fn on_update_error(&self, client: &Client, error: &anyhow::Error, update: &Update) {
        tracing::error!("[{}] error processing {}: {error:?}", client.name(), update.type_name());
    }

    fn on_request_error(&self, client: &Client, error: &anyhow::Error, context: &str) {
        tracing::error!("[{}] error in {context}: {error:?}", client.name());
    }
}

/// Most reports [`ReportToChat`] sends before going quiet.
pub const MAX_REPORTS: i32 = 10;

/// Logs every error and forwards the first few to an operator chat.
///
/// Reporting stops after [`MAX_REPORTS`] reports, and for good after a
/// report fails to send.
pub struct ReportToChat {
    chat_id: ChatId,
    max_reports: i32,
    sent: Arc<AtomicI32>,
}

impl ReportToChat {
    pub fn new(chat_id: ChatId) -> Self {
        Self { chat_id, max_reports: MAX_REPORTS, sent: Arc::new(AtomicI32::new(0)) }
    }

    pub fn with_max_reports(mut self, max_reports: i32) -> Self {
        self.max_reports = max_reports;
        self
    }

    /// Reports sent so far, or `-1` once reporting is disabled.
    pub fn reports_sent(&self) -> i32 {
        self.sent.load(Ordering::Acquire)
    }

    fn report(&self, client: &Client, text: String) {
        let max = self.max_reports;
        let claimed = self
            .sent
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (0..max).contains(&n).then_some(n + 1));
        if claimed.is_err() {
            return;
        }
        let chat_id = self.chat_id;
        let sent = self.sent.clone();
        let reporter = client.clone();
        client.spawn(async move {
            if let Err(e) = reporter.send_text(chat_id, text).await {
                tracing::warn!("[{}] error report failed, reporting disabled: {e}", reporter.name());
                sent.store(-1, Ordering::Release);
            }
        });
    }
}

impl ErrorHandler for ReportToChat {
    fn on_update_error(&self, client: &Client, error: &anyhow::Error, update: &Update) {
        LogErrors.on_update_error(client, error, update);
        self.report(client, format!("Error processing {}:\n{error:?}", update.type_name()));
    }

    fn on_request_error(&self, client: &Client, error: &anyhow::Error, context: &str) {
        LogErrors.on_request_error(client, error, context);
        self.report(client, format!("Error in {context}:\n{error:?}"));
    }
}
