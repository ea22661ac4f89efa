pub mod run_lock;
pub mod runner;
pub mod state_machine;

pub use run_lock::RunLock;
pub use runner::{LifecycleConfig, RunLifecycle, RunOutcome};
pub use state_machine::{RunEvent, RunState, RunStateMachine};
