use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Capability;
use crate::types::Event;

/// Polls `config.url` and produces the JSON response body.
#[derive(Debug, Clone)]
pub struct HttpFetchCapability {
    client: reqwest::Client,
}

impl HttpFetchCapability {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn url(config: &Value) -> Result<&str> {
        config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("http_fetch agent requires a `url` string in its config"))
    }
}

impl Default for HttpFetchCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for HttpFetchCapability {
    fn name(&self) -> &str {
        "http_fetch"
    }

    fn can_receive_events(&self) -> bool {
        false
    }

    async fn run(
        &self,
        _events: &[Event],
        config: &Value,
        _last_run: Option<DateTime<Utc>>,
    ) -> Result<Option<Value>> {
        let url = Self::url(config)?;
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("GET {} failed with {}: {}", url, status, body);
        }

        let body: Value = response.json().await?;
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_from_config() {
        let config = json!({"url": "https://example.com/feed.json"});
        assert_eq!(
            HttpFetchCapability::url(&config).unwrap(),
            "https://example.com/feed.json"
        );
    }

    #[tokio::test]
    async fn test_missing_url_fails_before_request() {
        let cap = HttpFetchCapability::new();
        let err = cap.run(&[], &json!({}), None).await.unwrap_err();
        assert!(err.to_string().contains("url"));
    }
}
