use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Capability;
use crate::types::Event;

/// Source agent that produces `config.data` on every run.
pub struct EmitterCapability;

impl EmitterCapability {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmitterCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for EmitterCapability {
    fn name(&self) -> &str {
        "emitter"
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
        Ok(config.get("data").filter(|v| !v.is_null()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_emits_configured_data() {
        let cap = EmitterCapability::new();
        let payload = cap.run(&[], &json!({"data": {"k": 1}}), None).await.unwrap();
        assert_eq!(payload, Some(json!({"k": 1})));
    }

    #[tokio::test]
    async fn test_missing_data_emits_nothing() {
        let cap = EmitterCapability::new();
        assert_eq!(cap.run(&[], &json!({}), None).await.unwrap(), None);
        assert_eq!(cap.run(&[], &json!({"data": null}), None).await.unwrap(), None);
    }
}
