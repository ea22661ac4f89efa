pub mod api;
pub mod capabilities;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod storage;
pub mod types;

pub use capabilities::{Capability, CapabilityRegistry};
pub use config::Config;
pub use engine::{EventRouter, Registry, Scheduler, SourceFilter, SubscriptionGraph};
pub use error::{Result, SchedulerError};
pub use lifecycle::{RunLifecycle, RunOutcome};
pub use types::*;
