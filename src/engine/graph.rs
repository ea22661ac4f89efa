use std::sync::Arc;

use crate::error::{Result, SchedulerError};
use crate::storage::Storage;
use crate::types::{AgentId, AgentRecord, Edge};

/// Directed subscription edges between agents. An edge `listener -> source`
/// means the listener receives what the source produces. Cycles are allowed.
#[derive(Clone)]
pub struct SubscriptionGraph {
    storage: Arc<dyn Storage>,
}

impl SubscriptionGraph {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Subscribes `listener` to every source that can generate events.
    /// Sources that cannot are skipped. Returns the edges written.
    pub async fn subscribe(
        &self,
        listener: &AgentRecord,
        sources: &[AgentRecord],
    ) -> Result<Vec<Edge>> {
        let edges: Vec<Edge> = sources
            .iter()
            .filter(|source| {
                if !source.can_generate_events {
                    log::debug!(
                        "Skipping subscription of {} to {}: source cannot generate events",
                        listener.name,
                        source.name
                    );
                }
                source.can_generate_events
            })
            .map(|source| Edge {
                agent: listener.id,
                source: source.id,
            })
            .collect();

        self.storage.create_edges(&edges).await?;
        Ok(edges)
    }

    /// Agents subscribed to `agent`.
    pub async fn listeners(&self, agent: &AgentRecord) -> Result<Vec<AgentRecord>> {
        let ids = self.storage.listeners_of(agent.id).await?;
        self.resolve(agent, &ids, "listener").await
    }

    /// Agents `agent` is subscribed to.
    pub async fn sources(&self, agent: &AgentRecord) -> Result<Vec<AgentRecord>> {
        let ids = self.storage.sources_of(agent.id).await?;
        self.resolve(agent, &ids, "source").await
    }

    async fn resolve(
        &self,
        agent: &AgentRecord,
        ids: &[AgentId],
        role: &str,
    ) -> Result<Vec<AgentRecord>> {
        let records = self.storage.get_agents(ids).await?;
        ids.iter()
            .zip(records)
            .map(|(id, record)| {
                record.ok_or_else(|| SchedulerError::RoutingInconsistency {
                    context: format!("{} edge of agent {}", role, agent.id),
                    missing: *id,
                })
            })
            .collect()
    }
}
