pub mod agent;
pub mod event;
pub mod webhook;

pub use agent::{AgentRecord, Edge};
pub use event::Event;
pub use webhook::{WebhookRequest, WebhookResponse};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AgentId = Uuid;
pub type EventId = Uuid;

/// Filters accepted by agent listing queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFilter {
    pub active_only: bool,
    pub kind: Option<String>,
    pub name: Option<String>,
}

impl Default for AgentFilter {
    fn default() -> Self {
        Self {
            active_only: true,
            kind: None,
            name: None,
        }
    }
}

impl AgentFilter {
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn including_inactive(mut self) -> Self {
        self.active_only = false;
        self
    }

    pub fn matches(&self, agent: &AgentRecord) -> bool {
        if self.active_only && !agent.is_active {
            return false;
        }
        if let Some(kind) = &self.kind {
            if &agent.kind != kind {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &agent.name != name {
                return false;
            }
        }
        true
    }
}

/// Predicates for inbox and outbox event queries.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub target: Option<AgentId>,
    pub source: Option<AgentId>,
    /// When set, `event.source` must be one of these ids. An empty set matches nothing.
    pub sources: Option<Vec<AgentId>>,
    pub include_done: bool,
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Undone events addressed to `target`.
    pub fn inbox(target: AgentId, limit: usize) -> Self {
        Self {
            target: Some(target),
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// Undone events produced by `source`.
    pub fn outbox(source: AgentId, limit: usize) -> Self {
        Self {
            source: Some(source),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn from_sources(mut self, sources: Vec<AgentId>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn from_source(mut self, source: AgentId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.include_done && event.is_done {
            return false;
        }
        if let Some(target) = self.target {
            if event.target != target {
                return false;
            }
        }
        if let Some(source) = self.source {
            if event.source != source {
                return false;
            }
        }
        if let Some(sources) = &self.sources {
            if !sources.contains(&event.source) {
                return false;
            }
        }
        true
    }
}
