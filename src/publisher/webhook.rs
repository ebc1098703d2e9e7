//! Webhook publisher: POSTs each envelope as JSON to one endpoint.

use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::{Envelope, EventPublisher, LifecycleEvent, PublishError, Topics};
use crate::detection::{BatchSummary, DetectionResult};
use crate::tracking::TrackingUpdate;

pub struct WebhookPublisher {
    url: String,
    topics: Topics,
    http_client: reqwest::Client,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WebhookPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookPublisher")
            .field("url", &self.url)
            .field("topics", &self.topics)
            .finish()
    }
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>, topic_prefix: &str, timeout: Duration) -> Result<Self, PublishError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            url: url.into(),
            topics: Topics::new(topic_prefix),
            http_client,
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// POST one envelope and wait for the response
    pub async fn deliver(&self, envelope: &Envelope) -> Result<(), PublishError> {
        post(&self.http_client, &self.url, envelope).await
    }

    fn dispatch(&self, envelopes: Vec<Envelope>) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("{}, skipping {} events", PublishError::NoRuntime, envelopes.len());
                return;
            }
        };

        let client = self.http_client.clone();
        let url = self.url.clone();
        let task = handle.spawn(async move {
            for envelope in &envelopes {
                match post(&client, &url, envelope).await {
                    Ok(()) => tracing::debug!("Published {} to {}", envelope.key, envelope.topic),
                    Err(e) => tracing::warn!("Failed to publish {} to {}: {}", envelope.key, envelope.topic, e),
                }
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }
}

async fn post(client: &reqwest::Client, url: &str, envelope: &Envelope) -> Result<(), PublishError> {
    let response = client.post(url).json(envelope).send().await?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(PublishError::Status(response.status().as_u16()))
    }
}

impl EventPublisher for WebhookPublisher {
    fn publish_detection(&self, results: &[DetectionResult], summary: &BatchSummary) {
        self.dispatch(self.topics.detection_envelopes(results, summary, Utc::now()));
    }

    fn publish_tracking(&self, update: &TrackingUpdate) {
        self.dispatch(vec![self.topics.tracking_envelope(update, Utc::now())]);
    }

    fn publish_lifecycle(&self, event: LifecycleEvent) {
        self.dispatch(vec![self.topics.lifecycle_envelope(&event, Utc::now())]);
    }

    fn take_pending(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.pending.lock())
    }
}
