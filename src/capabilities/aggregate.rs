use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Capability;
use crate::types::Event;

/// Collects the payloads of all inbound events into one list, in fetch order.
pub struct AggregateCapability;

impl AggregateCapability {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AggregateCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for AggregateCapability {
    fn name(&self) -> &str {
        "aggregate"
    }

    async fn run(
        &self,
        events: &[Event],
        _config: &Value,
        _last_run: Option<DateTime<Utc>>,
    ) -> Result<Option<Value>> {
        if events.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::Array(
            events.iter().map(|e| e.data.clone()).collect(),
        )))
    }
}
