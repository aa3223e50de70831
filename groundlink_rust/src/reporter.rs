use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use groundlink_core::telemetry::TelemetryRecord;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Path live telemetry is posted to, relative to the backend base URL.
pub const TELEMETRY_PATH: &str = "/api/telemetry";
/// Path replayed telemetry is posted to.
pub const REPLAY_PATH: &str = "/api/replay";
/// Body key tagging a replayed record with its replay.
pub const REPLAY_ID_KEY: &str = "replay_id";

/// Where records go and how they are tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEndpoint {
    /// Path appended to the base URL.
    pub path: String,
    /// Set for replayed sessions; added to every posted body.
    pub replay_id: Option<String>,
}

impl ReportEndpoint {
    pub fn live() -> Self {
        Self {
            path: TELEMETRY_PATH.to_string(),
            replay_id: None,
        }
    }

    pub fn replay(replay_id: impl Into<String>) -> Self {
        Self {
            path: REPLAY_PATH.to_string(),
            replay_id: Some(replay_id.into()),
        }
    }

    /// Overrides the path, keeping the replay tag.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    /// JSON body posted for `record`.
    pub fn body(&self, record: &TelemetryRecord) -> Result<Value> {
        let mut body = serde_json::to_value(record).context("failed to serialize record")?;
        if let Some(replay_id) = &self.replay_id
            && let Value::Object(fields) = &mut body
        {
            fields.insert(REPLAY_ID_KEY.to_string(), Value::String(replay_id.clone()));
        }
        Ok(body)
    }
}

impl Default for ReportEndpoint {
    fn default() -> Self {
        Self::live()
    }
}

/// What the backend sends back for a posted record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReportReceipt {
    /// Link to a rendered artifact (e.g. a plot) for display.
    #[serde(default)]
    pub url: Option<String>,
    /// Digest of the stored record.
    #[serde(default)]
    pub hash: Option<i64>,
}

/// Posts telemetry records to the backend from a background thread.
///
/// Records are queued on an unbounded channel, so `report` never waits on the network. A
/// failed post is logged and counted; it never reaches the decoder.
pub struct TelemetryReporter {
    record_sender: Option<Sender<TelemetryRecord>>,
    receipt_receiver: Receiver<ReportReceipt>,
    join_handle: Option<JoinHandle<ReportTotals>>,
}

/// Outcome counts for a reporter's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportTotals {
    pub sent: u64,
    pub failed: u64,
}

impl TelemetryReporter {
    /// Starts a reporter posting live telemetry to [`TELEMETRY_PATH`].
    pub fn spawn(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::spawn_to(base_url, ReportEndpoint::live(), timeout)
    }

    /// Starts the reporter thread.
    ///
    /// # Arguments
    ///
    /// - `base_url` (`&str`) - Backend address, e.g. "http://localhost:8080".
    /// - `target` (`ReportEndpoint`) - Path and replay tag for every post.
    /// - `timeout` (`Duration`) - Per-request timeout.
    pub fn spawn_to(base_url: &str, target: ReportEndpoint, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        let endpoint = target.url(base_url);

        let (record_sender, record_receiver) = channel::<TelemetryRecord>();
        let (receipt_sender, receipt_receiver) = channel();

        info!(%endpoint, replay_id = ?target.replay_id, "telemetry reporting enabled");
        let handle = thread::spawn(move || {
            let mut totals = ReportTotals::default();
            // Runs until every sender is dropped.
            while let Ok(record) = record_receiver.recv() {
                match post_record(&http, &endpoint, &target, &record) {
                    Ok(receipt) => {
                        totals.sent += 1;
                        debug!(?receipt, "telemetry reported");
                        // Nobody listening for receipts is fine.
                        let _ = receipt_sender.send(receipt);
                    }
                    Err(e) => {
                        totals.failed += 1;
                        warn!(error = %format!("{e:#}"), "telemetry report failed");
                    }
                }
            }
            totals
        });

        Ok(Self {
            record_sender: Some(record_sender),
            receipt_receiver,
            join_handle: Some(handle),
        })
    }

    /// Queues a record for posting.
    pub fn report(&self, record: TelemetryRecord) {
        if let Some(sender) = &self.record_sender
            && sender.send(record).is_err()
        {
            warn!("telemetry reporter thread has exited");
        }
    }

    /// A sender other threads can queue records on.
    pub fn sender(&self) -> Option<Sender<TelemetryRecord>> {
        self.record_sender.clone()
    }

    /// Receipts returned by the backend so far.
    pub fn receipts(&self) -> Vec<ReportReceipt> {
        self.receipt_receiver.try_iter().collect()
    }

    /// Stops accepting records, waits for queued ones to be posted and returns the totals.
    pub fn finish(mut self) -> Result<ReportTotals> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<ReportTotals> {
        self.record_sender = None;
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("Reporter thread panicked")),
            None => Ok(ReportTotals::default()),
        }
    }
}

impl Drop for TelemetryReporter {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn post_record(
    http: &HttpClient,
    endpoint: &str,
    target: &ReportEndpoint,
    record: &TelemetryRecord,
) -> Result<ReportReceipt> {
    let response = http
        .post(endpoint)
        .json(&target.body(record)?)
        .send()
        .context("failed to reach backend")?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("backend rejected telemetry: {}", status);
    }
    response
        .json()
        .context("failed to parse backend receipt")
}
