use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::CapabilityRegistry;
use crate::engine::graph::SubscriptionGraph;
use crate::engine::registry::Registry;
use crate::engine::router::{EventRouter, RouterConfig};
use crate::error::Result;
use crate::lifecycle::{LifecycleConfig, RunLifecycle, RunOutcome};
use crate::storage::Storage;
use crate::types::AgentId;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub router: RouterConfig,
    pub lifecycle: LifecycleConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            router: RouterConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub completed: Vec<AgentId>,
    pub busy: Vec<AgentId>,
    pub inactive: Vec<AgentId>,
    pub failed: Vec<(AgentId, String)>,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} busy, {} inactive, {} failed",
            self.completed.len(),
            self.busy.len(),
            self.inactive.len(),
            self.failed.len()
        )
    }
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
            && self.busy.is_empty()
            && self.inactive.is_empty()
            && self.failed.is_empty()
    }
}

/// Wires the registry, router and lifecycle over one store and polls for due
/// agents.
#[derive(Clone)]
pub struct Scheduler {
    registry: Registry,
    lifecycle: RunLifecycle,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        capabilities: CapabilityRegistry,
        config: SchedulerConfig,
    ) -> Self {
        let graph = SubscriptionGraph::new(storage.clone());
        let router = EventRouter::new(storage.clone(), graph.clone(), config.router);
        let registry = Registry::new(storage.clone(), graph, capabilities.clone());
        let lifecycle = RunLifecycle::new(storage, router, capabilities, config.lifecycle);

        Self {
            registry,
            lifecycle,
            tick_interval: config.tick_interval,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &RunLifecycle {
        &self.lifecycle
    }

    pub fn router(&self) -> &EventRouter {
        self.lifecycle.router()
    }

    /// Runs every agent due at `now` once.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let due = self.registry.due(now).await?;
        let mut report = TickReport::default();

        for (agent, outcome) in self.lifecycle.run_due(due).await {
            match outcome {
                Ok(RunOutcome::Completed { .. }) => report.completed.push(agent.id),
                Ok(RunOutcome::Busy) => report.busy.push(agent.id),
                Ok(RunOutcome::Inactive) => report.inactive.push(agent.id),
                Err(e) => report.failed.push((agent.id, e.to_string())),
            }
        }

        Ok(report)
    }

    /// Ticks on a fixed interval until `shutdown` resolves. Tick errors are
    /// logged and the loop carries on; retry policy is left to the next tick.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(report) if !report.is_empty() => log::info!("Tick: {}", report),
                        Ok(_) => log::trace!("Tick: nothing due"),
                        Err(e) => log::warn!("Scheduler tick failed: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use serde_json::json;

    fn create_scheduler() -> Scheduler {
        Scheduler::new(
            Arc::new(InMemoryStore::new()),
            CapabilityRegistry::with_builtins(),
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_tick_runs_due_agents_and_reschedules() {
        let scheduler = create_scheduler();
        let emitter = scheduler
            .registry()
            .register("ticker", "emitter", json!({"data": "tick"}), None)
            .await
            .unwrap();
        scheduler
            .registry()
            .schedule(emitter.id, chrono::Duration::seconds(60))
            .await
            .unwrap();

        let report = scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.completed, vec![emitter.id]);

        let after = scheduler.registry().get(emitter.id).await.unwrap();
        let last_run = after.last_run.unwrap();
        assert_eq!(after.next_run, Some(last_run + chrono::Duration::seconds(60)));
        assert!(!after.is_running);

        let report = scheduler.tick(Utc::now()).await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_tick_reports_failures_without_stopping() {
        let scheduler = create_scheduler();
        let broken = scheduler
            .registry()
            .register("broken", "http_fetch", json!({}), None)
            .await
            .unwrap();
        let fine = scheduler
            .registry()
            .register("fine", "emitter", json!({}), None)
            .await
            .unwrap();
        for id in [broken.id, fine.id] {
            scheduler
                .registry()
                .schedule(id, chrono::Duration::seconds(60))
                .await
                .unwrap();
        }

        let report = scheduler.tick(Utc::now()).await.unwrap();

        assert_eq!(report.completed, vec![fine.id]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, broken.id);
        assert!(!scheduler.registry().get(broken.id).await.unwrap().is_running);
    }

    #[test]
    fn test_report_summary_counts_every_outcome() {
        let report = TickReport {
            completed: vec![AgentId::new_v4()],
            busy: Vec::new(),
            inactive: vec![AgentId::new_v4(), AgentId::new_v4()],
            failed: vec![(AgentId::new_v4(), "boom".to_string())],
        };
        assert_eq!(
            report.to_string(),
            "1 completed, 0 busy, 2 inactive, 1 failed"
        );
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let scheduler = create_scheduler();
        tokio::time::timeout(Duration::from_secs(1), scheduler.run_until(async {}))
            .await
            .unwrap();
    }
}
