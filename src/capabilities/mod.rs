pub mod aggregate;
pub mod emitter;
pub mod http_fetch;
pub mod log_sink;
pub mod webhook_echo;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SchedulerError;
use crate::types::{Event, WebhookRequest, WebhookResponse};

pub use aggregate::AggregateCapability;
pub use emitter::EmitterCapability;
pub use http_fetch::HttpFetchCapability;
pub use log_sink::LogSinkCapability;
pub use webhook_echo::WebhookEchoCapability;

/// Per-type agent logic. The event flags are static for a given capability and
/// are copied onto every agent registered with it.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Type tag stored on agent records.
    fn name(&self) -> &str;

    fn can_receive_events(&self) -> bool {
        true
    }

    fn can_generate_events(&self) -> bool {
        true
    }

    /// Consume inbound events and optionally produce one payload for listeners.
    async fn run(
        &self,
        events: &[Event],
        config: &Value,
        last_run: Option<DateTime<Utc>>,
    ) -> Result<Option<Value>>;

    async fn receive_webhook(&self, _request: WebhookRequest) -> Result<WebhookResponse> {
        Ok(WebhookResponse::method_not_allowed())
    }
}

/// Maps type tags to capability implementations. Built once at startup.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EmitterCapability::new()));
        registry.register(Arc::new(AggregateCapability::new()));
        registry.register(Arc::new(LogSinkCapability::new()));
        registry.register(Arc::new(HttpFetchCapability::new()));
        registry.register(Arc::new(WebhookEchoCapability::new()));
        registry
    }

    /// Registers `capability` under its own name, replacing any previous entry.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities
            .insert(capability.name().to_string(), capability);
    }

    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn Capability>, SchedulerError> {
        self.capabilities
            .get(kind)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownCapability(kind.to_string()))
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.capabilities.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve_by_name() {
        let registry = CapabilityRegistry::with_builtins();
        for kind in ["aggregate", "emitter", "http_fetch", "log_sink", "webhook_echo"] {
            let capability = registry.resolve(kind).unwrap();
            assert_eq!(capability.name(), kind);
        }
        assert_eq!(registry.kinds().len(), 5);
    }

    #[test]
    fn test_unknown_capability() {
        let registry = CapabilityRegistry::with_builtins();
        let result = registry.resolve("muninn.agents.Missing");
        assert!(matches!(result, Err(SchedulerError::UnknownCapability(kind)) if kind == "muninn.agents.Missing"));
    }
}
