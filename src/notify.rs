//! Best-effort completion notifications.
//!
//! After a unit result is saved, an optional webhook is told about it.
//! This is non-blocking and non-critical: the POST runs on a spawned task
//! with a bounded timeout, and failures are swallowed. Nothing in the
//! pipeline ever waits on, or fails because of, a notification.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize)]
struct UnitNotification<'a> {
    job_id: &'a str,
    unit_index: usize,
    event: &'a str,
}

pub struct Notifier {
    endpoint: String,
    client: Client,
}

impl Notifier {
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(1))
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self { endpoint, client }
    }

    /// Fire-and-forget "unit translated" event.
    pub fn unit_translated(&self, job_id: &str, unit_index: usize) {
        self.send("unit_translated", job_id, unit_index);
    }

    /// Fire-and-forget "job completed" event.
    pub fn job_completed(&self, job_id: &str) {
        self.send("job_completed", job_id, 0);
    }

    fn send(&self, event: &'static str, job_id: &str, unit_index: usize) {
        let body = UnitNotification {
            job_id,
            unit_index,
            event,
        };
        let request = self.client.post(&self.endpoint).json(&body);
        tokio::spawn(async move {
            let _ = tokio::time::timeout(NOTIFY_TIMEOUT, request.send()).await;
        });
    }
}
