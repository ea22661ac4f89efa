use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::traits::Storage;
use crate::types::{AgentFilter, AgentId, AgentRecord, Edge, Event, EventId, EventQuery};

#[derive(Clone)]
pub struct InMemoryStore {
    agents: Arc<RwLock<HashMap<AgentId, AgentRecord>>>,
    edges: Arc<RwLock<Vec<Edge>>>,
    // Append-only, so iteration order is creation order.
    events: Arc<RwLock<Vec<Event>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            edges: Arc::new(RwLock::new(Vec::new())),
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<'a, T>(lock: &'a RwLock<T>, table: &str) -> Result<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| anyhow!("{} table lock poisoned", table))
}

fn write<'a, T>(lock: &'a RwLock<T>, table: &str) -> Result<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| anyhow!("{} table lock poisoned", table))
}

fn sorted_by_creation(mut agents: Vec<AgentRecord>) -> Vec<AgentRecord> {
    agents.sort_by_key(|a| a.created_at);
    agents
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn create_agent(&self, agent: &AgentRecord) -> Result<()> {
        let mut agents = write(&self.agents, "agents")?;
        agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentRecord>> {
        let agents = read(&self.agents, "agents")?;
        Ok(agents.get(&id).cloned())
    }

    async fn get_agents(&self, ids: &[AgentId]) -> Result<Vec<Option<AgentRecord>>> {
        let agents = read(&self.agents, "agents")?;
        Ok(ids.iter().map(|id| agents.get(id).cloned()).collect())
    }

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>> {
        let agents = read(&self.agents, "agents")?;
        Ok(sorted_by_creation(
            agents.values().filter(|a| filter.matches(a)).cloned().collect(),
        ))
    }

    async fn due_agents(&self, now: DateTime<Utc>) -> Result<Vec<AgentRecord>> {
        let agents = read(&self.agents, "agents")?;
        Ok(sorted_by_creation(
            agents.values().filter(|a| a.is_due(now)).cloned().collect(),
        ))
    }

    async fn set_agent_active(&self, id: AgentId, active: bool) -> Result<bool> {
        let mut agents = write(&self.agents, "agents")?;
        match agents.get_mut(&id) {
            Some(agent) => {
                agent.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_agent_schedule(
        &self,
        id: AgentId,
        interval_secs: Option<i64>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut agents = write(&self.agents, "agents")?;
        match agents.get_mut(&id) {
            Some(agent) => {
                agent.interval_secs = interval_secs;
                agent.next_run = next_run;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn claim_agent(&self, id: AgentId) -> Result<bool> {
        let mut agents = write(&self.agents, "agents")?;
        match agents.get_mut(&id) {
            Some(agent) if agent.is_active && !agent.is_running => {
                agent.is_running = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_agent(
        &self,
        id: AgentId,
        last_run: DateTime<Utc>,
        reschedule: bool,
    ) -> Result<()> {
        let mut agents = write(&self.agents, "agents")?;
        let agent = agents
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Cannot release missing agent {}", id))?;
        if reschedule {
            agent.next_run = agent.next_run_after(last_run);
        }
        agent.is_running = false;
        agent.last_run = Some(last_run);
        Ok(())
    }

    async fn create_edges(&self, new_edges: &[Edge]) -> Result<()> {
        let mut edges = write(&self.edges, "edges")?;
        for edge in new_edges {
            if !edges.contains(edge) {
                edges.push(*edge);
            }
        }
        Ok(())
    }

    async fn listeners_of(&self, source: AgentId) -> Result<Vec<AgentId>> {
        let edges = read(&self.edges, "edges")?;
        Ok(edges
            .iter()
            .filter(|e| e.source == source)
            .map(|e| e.agent)
            .collect())
    }

    async fn sources_of(&self, agent: AgentId) -> Result<Vec<AgentId>> {
        let edges = read(&self.edges, "edges")?;
        Ok(edges
            .iter()
            .filter(|e| e.agent == agent)
            .map(|e| e.source)
            .collect())
    }

    async fn create_events(&self, new_events: &[Event]) -> Result<()> {
        let mut events = write(&self.events, "events")?;
        events.extend_from_slice(new_events);
        Ok(())
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let events = read(&self.events, "events")?;
        let matching = events.iter().filter(|e| query.matches(e)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn mark_events_done(&self, ids: &[EventId]) -> Result<()> {
        let mut events = write(&self.events, "events")?;
        for event in events.iter_mut().filter(|e| ids.contains(&e.id)) {
            event.is_done = true;
        }
        Ok(())
    }
}
