// crates/driftwatch-daemon/src/feed.rs
//
// HTTP sample feed: pulls the samples the inference service observed since
// the previous pull. The endpoint answers `GET` with a JSON array of
// `{ observed_at, features: { id: value }, output }` objects.

use std::time::Duration;

use async_trait::async_trait;

use driftwatch_core::{DriftwatchError, Sample, SampleSource};

/// `SampleSource` backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSampleSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSampleSource {
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
impl SampleSource for HttpSampleSource {
    async fn sample(&self) -> Result<Vec<Sample>, DriftwatchError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DriftwatchError::Feed(format!("GET {} failed: {}", self.url, e)))?;

        if !resp.status().is_success() {
            return Err(DriftwatchError::Feed(format!(
                "GET {} returned status {}",
                self.url,
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| DriftwatchError::Feed(format!("reading {} failed: {}", self.url, e)))?;
        parse_samples(&body)
    }
}

/// Decode a feed response body.
pub fn parse_samples(body: &str) -> Result<Vec<Sample>, DriftwatchError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(body)?)
}
