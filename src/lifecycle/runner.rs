use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::{Capability, CapabilityRegistry};
use crate::engine::router::{EventRouter, RunContext, SourceFilter};
use crate::error::{Result, SchedulerError};
use crate::lifecycle::run_lock::RunLock;
use crate::lifecycle::state_machine::{RunEvent, RunStateMachine};
use crate::storage::Storage;
use crate::types::{AgentRecord, WebhookRequest, WebhookResponse};

#[derive(Debug, Clone, Default)]
pub struct LifecycleConfig {
    /// Upper bound on a single capability call. `None` waits indefinitely.
    pub run_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The agent is deactivated; nothing was locked or run.
    Inactive,
    /// Another caller holds the run lock; the capability was not invoked.
    Busy,
    Completed { consumed: usize, produced: usize },
}

/// Executes agents under their run lock: fetch inbox, run the capability,
/// flush its output, then consume the inbox.
#[derive(Clone)]
pub struct RunLifecycle {
    storage: Arc<dyn Storage>,
    router: EventRouter,
    capabilities: CapabilityRegistry,
    config: LifecycleConfig,
}

impl RunLifecycle {
    pub fn new(
        storage: Arc<dyn Storage>,
        router: EventRouter,
        capabilities: CapabilityRegistry,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            storage,
            router,
            capabilities,
            config,
        }
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Runs `agent` once. Inbound events are marked done only after the
    /// produced payload has been flushed, so a failed run leaves them for the
    /// next attempt. The lock is released before any error is returned.
    pub async fn run(&self, agent: &AgentRecord) -> Result<RunOutcome> {
        if !agent.is_active {
            log::debug!("Skipping inactive agent '{}'", agent.name);
            return Ok(RunOutcome::Inactive);
        }

        let capability = self.capabilities.resolve(&agent.kind)?;
        let Some(lock) = RunLock::acquire(self.storage.clone(), agent, true).await? else {
            log::debug!("Agent '{}' is already running", agent.name);
            return Ok(RunOutcome::Busy);
        };

        let mut machine = RunStateMachine::new(agent.id);
        machine.advance(RunEvent::LockAcquired)?;

        let result = self.execute(agent, capability.as_ref(), &mut machine).await;
        let (consumed, produced) = self.finish(agent, lock, &mut machine, result).await?;

        log::info!(
            "Ran agent '{}': consumed {} event(s), produced {}",
            agent.name,
            consumed,
            produced
        );
        Ok(RunOutcome::Completed { consumed, produced })
    }

    async fn execute(
        &self,
        agent: &AgentRecord,
        capability: &dyn Capability,
        machine: &mut RunStateMachine,
    ) -> Result<(usize, usize)> {
        let mut events = self
            .router
            .receive_events(agent, SourceFilter::Subscribed)
            .await?;
        machine.advance(RunEvent::EventsFetched)?;

        let payload = self
            .bounded(agent, capability.run(&events, &agent.config, agent.last_run))
            .await?;

        let mut ctx = RunContext::new(agent.clone());
        if let Some(payload) = payload {
            self.router.queue_event(&mut ctx, payload);
        }
        machine.advance(RunEvent::PayloadReady)?;

        let produced = self.router.flush(&mut ctx).await?;
        self.router.mark_all_done(&mut events).await?;
        Ok((events.len(), produced))
    }

    /// Delivers a webhook request to the agent's capability under the run
    /// lock. Inactive agents get a 404 and busy ones a 409.
    pub async fn receive_webhook(
        &self,
        agent: &AgentRecord,
        request: WebhookRequest,
    ) -> Result<WebhookResponse> {
        if !agent.is_active {
            return Ok(WebhookResponse::not_found());
        }

        let capability = self.capabilities.resolve(&agent.kind)?;
        let Some(lock) = RunLock::acquire(self.storage.clone(), agent, false).await? else {
            return Ok(WebhookResponse::conflict());
        };

        let mut machine = RunStateMachine::new(agent.id);
        machine.advance(RunEvent::LockAcquired)?;
        machine.advance(RunEvent::WebhookReceived)?;

        let result = self
            .bounded(agent, capability.receive_webhook(request))
            .await;
        self.finish(agent, lock, &mut machine, result).await
    }

    /// Runs the given agents concurrently. One agent failing does not stop the
    /// others; each outcome is paired with its agent.
    pub async fn run_due(
        &self,
        due: Vec<AgentRecord>,
    ) -> Vec<(AgentRecord, Result<RunOutcome>)> {
        let runs = due.iter().map(|agent| self.run(agent));
        let outcomes = join_all(runs).await;
        due.into_iter().zip(outcomes).collect()
    }

    async fn bounded<T>(
        &self,
        agent: &AgentRecord,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        let result = match self.config.run_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call).await.map_err(|_| {
                SchedulerError::CapabilityTimeout {
                    agent: agent.id,
                    timeout,
                }
            })?,
            None => call.await,
        };

        result.map_err(|source| SchedulerError::CapabilityFailed {
            agent: agent.id,
            source,
        })
    }

    async fn finish<T>(
        &self,
        agent: &AgentRecord,
        lock: RunLock,
        machine: &mut RunStateMachine,
        result: Result<T>,
    ) -> Result<T> {
        let released = lock.release().await;

        match result {
            Ok(value) => {
                released?;
                machine.advance(RunEvent::Released)?;
                Ok(value)
            }
            Err(err) => {
                machine.abort();
                if let Err(release_err) = released {
                    log::error!(
                        "Failed to release agent '{}' after error: {}",
                        agent.name,
                        release_err
                    );
                }
                log::warn!("Agent '{}' failed: {}", agent.name, err);
                Err(err)
            }
        }
    }
}
