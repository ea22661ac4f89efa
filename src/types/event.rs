use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AgentId, EventId};

/// One opaque payload routed from a producing agent to one consuming agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub data: Value,
    pub source: AgentId,
    pub target: AgentId,
    pub is_done: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(data: Value, source: AgentId, target: AgentId) -> Self {
        Self {
            id: EventId::new_v4(),
            data,
            source,
            target,
            is_done: false,
            created_at: Utc::now(),
        }
    }
}
