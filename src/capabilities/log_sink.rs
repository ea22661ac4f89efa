use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Capability;
use crate::types::Event;

/// Terminal consumer: writes each inbound payload to the log.
pub struct LogSinkCapability;

impl LogSinkCapability {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogSinkCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for LogSinkCapability {
    fn name(&self) -> &str {
        "log_sink"
    }

    fn can_generate_events(&self) -> bool {
        false
    }

    async fn run(
        &self,
        events: &[Event],
        config: &Value,
        _last_run: Option<DateTime<Utc>>,
    ) -> Result<Option<Value>> {
        let label = config
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("log_sink");
        for event in events {
            log::info!("[{}] event {} from {}: {}", label, event.id, event.source, event.data);
        }
        Ok(None)
    }
}
