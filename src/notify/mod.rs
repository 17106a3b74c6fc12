use crate::remote::check_status;
use crate::retry::{with_retries, RequestError, RetryPolicy};
use anyhow::{Context, Result};
use std::time::Duration;

pub mod message;
pub use message::{build_report, WebhookPayload};

/// Delivers change reports to the outbound webhook.
///
/// One message per permitted notification; 429 responses are retried
/// honoring the server's wait hint, and exhaustion surfaces to the
/// scheduler so the entity is not marked notified.
pub struct Notifier {
    http: reqwest::Client,
    webhook_url: String,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(webhook_url: String, timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            http,
            webhook_url,
            policy,
        })
    }

    /// Send one report. Success is terminal; failure after retries is
    /// returned to the caller, which drops this notification for the pass.
    pub async fn send(&self, payload: &WebhookPayload) -> Result<(), RequestError> {
        with_retries(self.policy, "send_webhook", || self.post(payload)).await
    }

    async fn post(&self, payload: &WebhookPayload) -> Result<(), RequestError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| RequestError::Transient(anyhow::Error::new(e)))?;
        check_status(response)?;
        Ok(())
    }
}
