use serde_json::Value;
use std::sync::Arc;

use crate::engine::graph::SubscriptionGraph;
use crate::error::Result;
use crate::storage::Storage;
use crate::types::{AgentId, AgentRecord, Event, EventQuery};

pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Upper bound on events returned by one inbox query. There is no paging
    /// beyond the first page.
    pub page_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Which producers an inbox fetch accepts events from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFilter {
    /// The agent's declared sources in the subscription graph.
    Subscribed,
    /// Only these producers. An empty list matches nothing.
    Only(Vec<AgentId>),
    /// Every undone event targeted at the agent, whoever produced it.
    Any,
}

/// Transient per-run state. Lives only for one run and is never persisted.
#[derive(Debug)]
pub struct RunContext {
    agent: AgentRecord,
    outbox: Vec<Value>,
}

impl RunContext {
    pub fn new(agent: AgentRecord) -> Self {
        Self {
            agent,
            outbox: Vec::new(),
        }
    }

    pub fn agent(&self) -> &AgentRecord {
        &self.agent
    }

    pub fn pending(&self) -> &[Value] {
        &self.outbox
    }
}

#[derive(Clone)]
pub struct EventRouter {
    storage: Arc<dyn Storage>,
    graph: SubscriptionGraph,
    config: RouterConfig,
}

impl EventRouter {
    pub fn new(storage: Arc<dyn Storage>, graph: SubscriptionGraph, config: RouterConfig) -> Self {
        Self {
            storage,
            graph,
            config,
        }
    }

    pub fn graph(&self) -> &SubscriptionGraph {
        &self.graph
    }

    /// Undone events targeting `agent`, at most one page.
    pub async fn receive_events(
        &self,
        agent: &AgentRecord,
        filter: SourceFilter,
    ) -> Result<Vec<Event>> {
        if !agent.can_receive_events {
            return Ok(Vec::new());
        }

        let query = EventQuery::inbox(agent.id, self.config.page_size);
        let query = match filter {
            SourceFilter::Any => query,
            SourceFilter::Only(sources) => query.from_sources(sources),
            SourceFilter::Subscribed => {
                let sources = self.graph.sources(agent).await?;
                query.from_sources(sources.into_iter().map(|s| s.id).collect())
            }
        };

        Ok(self.storage.query_events(&query).await?)
    }

    /// Undone events for `agent` produced by one specific source.
    pub async fn events_from_source(
        &self,
        agent: &AgentRecord,
        source: &AgentRecord,
    ) -> Result<Vec<Event>> {
        let query = EventQuery::inbox(agent.id, self.config.page_size).from_source(source.id);
        Ok(self.storage.query_events(&query).await?)
    }

    /// Undone events produced by `agent`, whoever they target.
    pub async fn pending_from(&self, agent: &AgentRecord) -> Result<Vec<Event>> {
        let query = EventQuery::outbox(agent.id, self.config.page_size);
        Ok(self.storage.query_events(&query).await?)
    }

    /// Buffers a payload on the run context. Nothing is written until `flush`.
    pub fn queue_event(&self, ctx: &mut RunContext, payload: Value) {
        ctx.outbox.push(payload);
    }

    /// Writes one event per (payload, current listener) and empties the outbox.
    /// Returns the number of events written.
    pub async fn flush(&self, ctx: &mut RunContext) -> Result<usize> {
        let outbox = std::mem::take(&mut ctx.outbox);
        if outbox.is_empty() {
            return Ok(0);
        }

        let agent = &ctx.agent;
        if !agent.can_generate_events {
            log::debug!(
                "Discarding {} queued payload(s) from {}: agent cannot generate events",
                outbox.len(),
                agent.name
            );
            return Ok(0);
        }

        let listeners = self.graph.listeners(agent).await?;
        let events: Vec<Event> = outbox
            .iter()
            .flat_map(|payload| {
                listeners
                    .iter()
                    .map(move |listener| Event::new(payload.clone(), agent.id, listener.id))
            })
            .collect();

        self.storage.create_events(&events).await?;
        log::debug!(
            "Flushed {} payload(s) from {} to {} listener(s)",
            outbox.len(),
            agent.name,
            listeners.len()
        );
        Ok(events.len())
    }

    /// Queues and flushes a single payload outside of a run.
    pub async fn publish(&self, agent: &AgentRecord, payload: Value) -> Result<usize> {
        let mut ctx = RunContext::new(agent.clone());
        self.queue_event(&mut ctx, payload);
        self.flush(&mut ctx).await
    }

    /// Marks the event consumed. Calling it again is a no-op. Callers must only
    /// mark events addressed to agents they run.
    pub async fn mark_done(&self, event: &mut Event) -> Result<()> {
        if event.is_done {
            return Ok(());
        }
        self.storage.mark_events_done(&[event.id]).await?;
        event.is_done = true;
        Ok(())
    }

    pub async fn mark_all_done(&self, events: &mut [Event]) -> Result<()> {
        let ids: Vec<_> = events.iter().filter(|e| !e.is_done).map(|e| e.id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        self.storage.mark_events_done(&ids).await?;
        for event in events.iter_mut() {
            event.is_done = true;
        }
        Ok(())
    }
}
