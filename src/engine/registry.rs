use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::capabilities::CapabilityRegistry;
use crate::engine::graph::SubscriptionGraph;
use crate::error::{Result, SchedulerError};
use crate::storage::Storage;
use crate::types::{AgentFilter, AgentId, AgentRecord};

/// Longest accepted polling interval, about a century.
pub const MAX_INTERVAL_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Creation, lookup and scheduling of agent records.
#[derive(Clone)]
pub struct Registry {
    storage: Arc<dyn Storage>,
    graph: SubscriptionGraph,
    capabilities: CapabilityRegistry,
}

impl Registry {
    pub fn new(
        storage: Arc<dyn Storage>,
        graph: SubscriptionGraph,
        capabilities: CapabilityRegistry,
    ) -> Self {
        Self {
            storage,
            graph,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Creates an agent of the given capability kind. `sources` is ignored when
    /// the capability cannot receive events.
    pub async fn register(
        &self,
        name: &str,
        kind: &str,
        config: Value,
        sources: Option<&[AgentRecord]>,
    ) -> Result<AgentRecord> {
        let capability = self.capabilities.resolve(kind)?;
        let agent = AgentRecord::new(
            name.to_string(),
            kind.to_string(),
            config,
            capability.can_receive_events(),
            capability.can_generate_events(),
        );
        self.storage.create_agent(&agent).await?;

        if let Some(sources) = sources {
            if agent.can_receive_events {
                self.graph.subscribe(&agent, sources).await?;
            } else if !sources.is_empty() {
                log::debug!(
                    "Ignoring {} source(s) for {}: {} cannot receive events",
                    sources.len(),
                    agent.name,
                    kind
                );
            }
        }

        log::info!("Registered agent '{}' ({}) as {}", agent.name, agent.id, kind);
        Ok(agent)
    }

    pub async fn get(&self, id: AgentId) -> Result<AgentRecord> {
        self.storage
            .get_agent(id)
            .await?
            .ok_or(SchedulerError::AgentNotFound(id))
    }

    pub async fn find(&self, id: AgentId) -> Result<Option<AgentRecord>> {
        Ok(self.storage.get_agent(id).await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<AgentRecord>> {
        let filter = AgentFilter::default().with_name(name);
        Ok(self.storage.list_agents(&filter).await?.into_iter().next())
    }

    /// Agents matching `filter`. Ordering is not part of the contract.
    pub async fn list(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>> {
        Ok(self.storage.list_agents(filter).await?)
    }

    /// Active, idle agents whose `next_run` has passed.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<AgentRecord>> {
        Ok(self.storage.due_agents(now).await?)
    }

    /// Soft delete. The record and its events are kept.
    pub async fn deactivate(&self, id: AgentId) -> Result<()> {
        if !self.storage.set_agent_active(id, false).await? {
            return Err(SchedulerError::AgentNotFound(id));
        }
        log::info!("Deactivated agent {}", id);
        Ok(())
    }

    /// Checks that `every` is a whole number of seconds between one second and
    /// [`MAX_INTERVAL_SECS`]. Returns the interval in seconds.
    pub fn validate_interval(every: Duration) -> Result<i64> {
        let secs = every.num_seconds();
        if secs < 1 || every.subsec_nanos() != 0 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "interval must be a positive whole number of seconds, got {}",
                every
            )));
        }
        if secs > MAX_INTERVAL_SECS {
            return Err(SchedulerError::InvalidSchedule(format!(
                "interval of {}s exceeds the maximum of {}s",
                secs, MAX_INTERVAL_SECS
            )));
        }
        Ok(secs)
    }

    /// Runs the agent every `every`, starting with the next poll.
    pub async fn schedule(&self, id: AgentId, every: Duration) -> Result<()> {
        let secs = Self::validate_interval(every)?;
        let found = self
            .storage
            .set_agent_schedule(id, Some(secs), Some(Utc::now()))
            .await?;
        if !found {
            return Err(SchedulerError::AgentNotFound(id));
        }
        Ok(())
    }

    pub async fn unschedule(&self, id: AgentId) -> Result<()> {
        if !self.storage.set_agent_schedule(id, None, None).await? {
            return Err(SchedulerError::AgentNotFound(id));
        }
        Ok(())
    }
}
