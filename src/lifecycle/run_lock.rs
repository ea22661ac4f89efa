use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::storage::Storage;
use crate::types::{AgentId, AgentRecord};

/// Held `is_running` claim on one agent.
///
/// Call [`RunLock::release`] on every path. If the guard is dropped while
/// still held (panic, cancelled future, failed release) it releases from a
/// task spawned on the current tokio runtime.
pub struct RunLock {
    storage: Arc<dyn Storage>,
    agent: AgentId,
    reschedule: bool,
    held: bool,
}

impl RunLock {
    /// Atomically claims `agent`. Returns `None` if it is already running or
    /// no longer active. With `reschedule`, release moves `next_run` forward by
    /// the stored interval; otherwise the stored `next_run` is left as it is.
    /// Either way the schedule is read at release time, so changes made while
    /// the agent runs are kept.
    pub async fn acquire(
        storage: Arc<dyn Storage>,
        agent: &AgentRecord,
        reschedule: bool,
    ) -> Result<Option<Self>> {
        if !storage.claim_agent(agent.id).await? {
            return Ok(None);
        }

        Ok(Some(Self {
            storage,
            agent: agent.id,
            reschedule,
            held: true,
        }))
    }

    /// Clears `is_running` and stamps `last_run`. Returns the stamp.
    pub async fn release(mut self) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        self.storage
            .release_agent(self.agent, now, self.reschedule)
            .await?;
        self.held = false;
        Ok(now)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.held {
            return;
        }

        let storage = self.storage.clone();
        let agent = self.agent;
        let now = Utc::now();
        let reschedule = self.reschedule;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("Run lock for agent {} dropped while held; releasing", agent);
                handle.spawn(async move {
                    if let Err(e) = storage.release_agent(agent, now, reschedule).await {
                        log::error!("Failed to release run lock for agent {}: {}", agent, e);
                    }
                });
            }
            Err(_) => {
                log::error!(
                    "Run lock for agent {} dropped outside a tokio runtime; agent stays locked",
                    agent
                );
            }
        }
    }
}
