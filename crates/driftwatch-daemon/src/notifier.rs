// crates/driftwatch-daemon/src/notifier.rs
//
// Deployment notifiers. The webhook posts the promoted version to the
// deployment system; the log notifier is used when no webhook is
// configured. Failures are reported to the gate, which logs and audits
// them without reversing the promotion.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use driftwatch_core::{DeploymentNotifier, DriftwatchError, VersionId};

/// Body of the promotion webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionNotice<'a> {
    pub model: &'a str,
    pub version_id: VersionId,
    pub artifact_ref: &'a str,
}

/// Posts a `PromotionNotice` as JSON.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl DeploymentNotifier for WebhookNotifier {
    async fn notify(
        &self,
        model: &str,
        version_id: VersionId,
        artifact_ref: &str,
    ) -> Result<(), DriftwatchError> {
        let notice = PromotionNotice {
            model,
            version_id,
            artifact_ref,
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&notice)
            .send()
            .await
            .map_err(|e| {
                DriftwatchError::NotificationFailure(format!("POST {} failed: {}", self.url, e))
            })?;

        if resp.status().is_success() {
            tracing::info!("Notified {} of {} version {}", self.url, model, version_id);
            Ok(())
        } else {
            Err(DriftwatchError::NotificationFailure(format!(
                "POST {} returned status {}",
                self.url,
                resp.status()
            )))
        }
    }
}

/// Only logs promotions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl DeploymentNotifier for LogNotifier {
    async fn notify(
        &self,
        model: &str,
        version_id: VersionId,
        artifact_ref: &str,
    ) -> Result<(), DriftwatchError> {
        tracing::info!(
            "Promotion of {} version {} ({}) ready for deployment",
            model,
            version_id,
            artifact_ref
        );
        Ok(())
    }
}
