//! Agent execution runtime
//!
//! This crate provides the task registry with its cached view of persisted
//! task metadata, the executor that runs single task invocations with audit
//! bookkeeping, and the orchestrator that sequences invocations into
//! multi-step workflows.

mod cache;
mod executor;
mod memory;
mod orchestrator;
pub mod prompt;
mod registry;
mod runtime;

pub use cache::TtlCache;
pub use executor::{Executor, TaskRunner};
pub use memory::{MemoryStore, TASKS, TASK_EXECUTIONS, WORKFLOW_EXECUTIONS};
pub use orchestrator::{partition_steps, Orchestrator};
pub use registry::{CacheWindows, TaskRegistry};
pub use runtime::{AgentRuntime, ConfigError, RuntimeBuilder, RuntimeConfig};
