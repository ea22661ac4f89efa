use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::types::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Locked,
    Executing,
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    LockAcquired,
    EventsFetched,
    WebhookReceived,
    PayloadReady,
    Released,
}

/// Tracks one agent's progress through a single locked run.
#[derive(Debug)]
pub struct RunStateMachine {
    agent: AgentId,
    state: RunState,
}

impl RunStateMachine {
    pub fn new(agent: AgentId) -> Self {
        Self {
            agent,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn advance(&mut self, event: RunEvent) -> Result<RunState> {
        let next = match (self.state, event) {
            (RunState::Idle, RunEvent::LockAcquired) => RunState::Locked,
            (RunState::Locked, RunEvent::EventsFetched) => RunState::Executing,
            (RunState::Locked, RunEvent::WebhookReceived) => RunState::Executing,
            (RunState::Executing, RunEvent::PayloadReady) => RunState::Flushing,
            (RunState::Flushing, RunEvent::Released) => RunState::Idle,
            // Webhook calls never flush.
            (RunState::Executing, RunEvent::Released) => RunState::Idle,
            (from, event) => {
                return Err(SchedulerError::InvalidTransition {
                    agent: self.agent,
                    from,
                    event,
                });
            }
        };

        log::trace!("agent {}: {:?} -> {:?}", self.agent, self.state, next);
        self.state = next;
        Ok(next)
    }

    /// Failure from any locked state returns to idle once the lock is released.
    pub fn abort(&mut self) {
        if self.state != RunState::Idle {
            log::trace!("agent {}: {:?} -> Idle (failed)", self.agent, self.state);
        }
        self.state = RunState::Idle;
    }
}
