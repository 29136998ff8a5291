//! Core abstractions for the agent engine
//!
//! This crate provides the data model, error taxonomy and collaborator
//! traits (storage, text generation, task handlers) that the runtime and
//! the task library depend on. It has no runtime logic of its own.

mod error;
pub mod events;
mod execution;
mod generate;
mod store;
mod task;
mod workflow;

pub use error::{EngineError, ErrorCode, GenerationError, StoreError, TaskError};
pub use events::{EngineEvent, EventBus, EventEmitter, NoteLevel};
pub use execution::{
    CorrelationIds, ExecuteTaskRequest, ExecutionId, ExecutionRecord, ExecutionStatus,
    ExecutionUpdate, TriggerSource,
};
pub use generate::{Generation, GenerationRequest, TextGenerator};
pub use store::Store;
pub use task::{
    ExecutionContext, ExecutionMode, ExecutionResult, Payload, PersistedTask, TaskCategory,
    TaskConfig, TaskConfigPatch, TaskDefinition, TaskFilter, TaskHandler, TaskId, TaskMetrics,
};
pub use workflow::{
    ConditionEvaluator, ErrorPolicy, InputBuilder, InputMapping, StepAuditEntry, StepCallback,
    StepCondition, WorkflowContext, WorkflowDefinition, WorkflowExecutionRecord, WorkflowId,
    WorkflowResult, WorkflowStatus, WorkflowStep, WorkflowTrigger, WorkflowUpdate,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
