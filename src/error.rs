use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::{RunEvent, RunState};
use crate::types::AgentId;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("routing inconsistency: {context} references missing agent {missing}")]
    RoutingInconsistency { context: String, missing: AgentId },

    #[error("capability failed for agent {agent}: {source}")]
    CapabilityFailed {
        agent: AgentId,
        #[source]
        source: anyhow::Error,
    },

    #[error("capability for agent {agent} did not finish within {timeout:?}")]
    CapabilityTimeout { agent: AgentId, timeout: Duration },

    #[error("invalid run transition for agent {agent}: {from:?} on {event:?}")]
    InvalidTransition {
        agent: AgentId,
        from: RunState,
        event: RunEvent,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
