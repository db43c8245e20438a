//! Supervisor and parallel execution of runners.

pub mod executor;
pub mod supervisor;

pub use executor::{ExecutionResult, ExecutionStatus, ParallelExecutor, RunStatus, RunnerResult};
pub use supervisor::{Supervisor, SupervisorSession};
