pub mod graph;
pub mod registry;
pub mod router;
pub mod scheduler;

pub use graph::SubscriptionGraph;
pub use registry::Registry;
pub use router::{EventRouter, RouterConfig, RunContext, SourceFilter};
pub use scheduler::{Scheduler, SchedulerConfig, TickReport};
