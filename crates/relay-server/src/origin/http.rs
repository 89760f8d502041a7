//! reqwest-based origin client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{CacheKey, NormalizedRecord, Normalizer, OriginError, OriginFetcher};
use reqwest::{StatusCode, header};
use serde_json::Value;

use super::budget::CallBudget;
use crate::config::OriginConfig;

/// Fetches `GET {base_url}/{resource_type}/{id}[?query]` under a local call budget.
pub struct HttpOrigin {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    budget: CallBudget,
    normalizer: Arc<dyn Normalizer>,
}

impl HttpOrigin {
    pub fn new(config: &OriginConfig, normalizer: Arc<dyn Normalizer>) -> Result<Self, OriginError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| OriginError::upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            budget: CallBudget::per_minute(config.calls_per_minute),
            normalizer,
        })
    }

    pub fn budget(&self) -> &CallBudget {
        &self.budget
    }

    fn url_for(&self, key: &CacheKey) -> String {
        let mut url = format!("{}/{}/{}", self.base_url, key.resource_type(), key.id());
        if let Some(query) = key.query() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    async fn call(&self, key: &CacheKey) -> Result<Value, OriginError> {
        if let Err(wait) = self.budget.try_acquire() {
            tracing::debug!(key = %key, wait_ms = wait.as_millis() as u64, "local call budget exhausted");
            return Err(OriginError::RateLimited {
                retry_after: Some(wait),
            });
        }

        let url = self.url_for(key);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OriginError::upstream(format!("request to {url} timed out"))
                } else {
                    OriginError::upstream(format!("request to {url} failed: {e}"))
                }
            })?;

        match response.status() {
            status if status.is_success() => response
                .json::<Value>()
                .await
                .map_err(|e| OriginError::upstream(format!("invalid JSON body: {e}"))),
            StatusCode::NOT_FOUND => Err(OriginError::NotFound(key.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(OriginError::RateLimited { retry_after })
            }
            status => Err(OriginError::upstream(format!(
                "unexpected status {status} from {url}"
            ))),
        }
    }
}

#[async_trait]
impl OriginFetcher for HttpOrigin {
    async fn fetch(&self, key: &CacheKey) -> Result<NormalizedRecord, OriginError> {
        let result = self
            .call(key)
            .await
            .and_then(|body| self.normalizer.normalize(key, body));

        match &result {
            Ok(_) => crate::metrics::record_origin_call("ok"),
            Err(e) => {
                crate::metrics::record_origin_call(e.kind());
                tracing::warn!(key = %key, error = %e, kind = e.kind(), "origin fetch failed");
            }
        }
        result
    }
}
