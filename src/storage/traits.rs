use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{AgentFilter, AgentId, AgentRecord, Edge, Event, EventId, EventQuery};

/// Record store consumed by the scheduler. Writes are per-record; nothing here
/// spans a transaction except the conditional claim.
#[async_trait]
pub trait Storage: Send + Sync {
    // Agent operations
    async fn create_agent(&self, agent: &AgentRecord) -> Result<()>;
    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentRecord>>;
    /// Batch get. The result is aligned with `ids`; missing records are `None`.
    async fn get_agents(&self, ids: &[AgentId]) -> Result<Vec<Option<AgentRecord>>>;
    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>>;
    async fn due_agents(&self, now: DateTime<Utc>) -> Result<Vec<AgentRecord>>;
    async fn set_agent_active(&self, id: AgentId, active: bool) -> Result<bool>;
    async fn set_agent_schedule(
        &self,
        id: AgentId,
        interval_secs: Option<i64>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    // Run lock
    /// Sets `is_running` only if the agent is active and not already running.
    /// Returns whether this caller now holds the lock.
    async fn claim_agent(&self, id: AgentId) -> Result<bool>;
    /// Clears `is_running` and stamps `last_run` in one update. With
    /// `reschedule`, `next_run` is recomputed from the stored interval
    /// (cleared when there is none); otherwise the stored `next_run` is kept.
    async fn release_agent(
        &self,
        id: AgentId,
        last_run: DateTime<Utc>,
        reschedule: bool,
    ) -> Result<()>;

    // Subscription edges
    async fn create_edges(&self, edges: &[Edge]) -> Result<()>;
    async fn listeners_of(&self, source: AgentId) -> Result<Vec<AgentId>>;
    async fn sources_of(&self, agent: AgentId) -> Result<Vec<AgentId>>;

    // Events
    async fn create_events(&self, events: &[Event]) -> Result<()>;
    /// Matching events in creation order, truncated to `query.limit`.
    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>>;
    async fn mark_events_done(&self, ids: &[EventId]) -> Result<()>;
}
