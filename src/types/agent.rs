use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AgentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    /// Capability type tag, resolved through the capability registry.
    pub kind: String,
    pub is_active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub interval_secs: Option<i64>,
    pub config: Value,
    pub can_receive_events: bool,
    pub can_generate_events: bool,
    pub is_running: bool,
    pub created_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(
        name: String,
        kind: String,
        config: Value,
        can_receive_events: bool,
        can_generate_events: bool,
    ) -> Self {
        Self {
            id: AgentId::new_v4(),
            name,
            kind,
            is_active: true,
            last_run: None,
            next_run: None,
            interval_secs: None,
            config,
            can_receive_events,
            can_generate_events,
            is_running: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_running && self.next_run.is_some_and(|next| next <= now)
    }

    /// Next scheduled time after a run that finished at `finished_at`.
    /// Agents without an interval are one-shot and drop out of due selection,
    /// as do agents whose next run would fall outside the representable range.
    pub fn next_run_after(&self, finished_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = self.interval_secs?;
        let next = Duration::try_seconds(secs).and_then(|d| finished_at.checked_add_signed(d));
        if next.is_none() {
            log::warn!(
                "Interval of {}s for agent {} overflows; not rescheduling",
                secs,
                self.id
            );
        }
        next
    }
}

/// Subscription: `agent` receives the events produced by `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub agent: AgentId,
    pub source: AgentId,
}
