use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::Capability;
use crate::types::{Event, WebhookRequest, WebhookResponse};

/// Webhook-driven agent that answers every call with the request it received.
pub struct WebhookEchoCapability;

impl WebhookEchoCapability {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebhookEchoCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for WebhookEchoCapability {
    fn name(&self) -> &str {
        "webhook_echo"
    }

    fn can_receive_events(&self) -> bool {
        false
    }

    fn can_generate_events(&self) -> bool {
        false
    }

    async fn run(
        &self,
        _events: &[Event],
        _config: &Value,
        _last_run: Option<DateTime<Utc>>,
    ) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn receive_webhook(&self, request: WebhookRequest) -> Result<WebhookResponse> {
        Ok(WebhookResponse::ok(json!({
            "method": request.method,
            "query": request.query,
            "body": request.body,
        })))
    }
}
