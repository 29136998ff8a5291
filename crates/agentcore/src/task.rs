use crate::events::EventEmitter;
use crate::execution::{CorrelationIds, ExecutionId, TriggerSource};
use crate::{ErrorCode, Store, TaskError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Ordered key/value payload used for task inputs, outputs and shared context
pub type Payload = serde_json::Map<String, serde_json::Value>;

pub type TaskId = String;

/// Core trait that hand-written task handlers implement
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute one invocation with a fully resolved context
    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult, TaskError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Communication,
    Scheduling,
    Enrichment,
    Content,
    Analytics,
    Other,
}

/// How a task is expected to be invoked; informational for callers and listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Async,
    Batch,
}

/// Fully merged knobs for one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub model: Option<String>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            timeout_secs: 30,
            retry_attempts: 3,
            model: None,
        }
    }
}

impl TaskConfig {
    /// Overlay every field the patch sets
    pub fn apply(mut self, patch: &TaskConfigPatch) -> Self {
        if let Some(v) = patch.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = patch.temperature {
            self.temperature = v;
        }
        if let Some(v) = patch.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = patch.retry_attempts {
            self.retry_attempts = v;
        }
        if let Some(v) = &patch.model {
            self.model = Some(v.clone());
        }
        self
    }

    /// defaults < persisted record < in-code definition
    pub fn merged(
        defaults: &TaskConfig,
        persisted: Option<&TaskConfigPatch>,
        definition: Option<&TaskConfigPatch>,
    ) -> TaskConfig {
        let mut config = defaults.clone();
        if let Some(patch) = persisted {
            config = config.apply(patch);
        }
        if let Some(patch) = definition {
            config = config.apply(patch);
        }
        config
    }
}

/// Partial config as stored on a task record or declared in code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl TaskConfigPatch {
    pub fn is_empty(&self) -> bool {
        self == &TaskConfigPatch::default()
    }

    /// Fields set on `other` win
    pub fn merge(&mut self, other: &TaskConfigPatch) {
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.retry_attempts.is_some() {
            self.retry_attempts = other.retry_attempts;
        }
        if other.model.is_some() {
            self.model = other.model.clone();
        }
    }
}

/// In-code task definition held by the registry
#[derive(Clone)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub name: String,
    pub category: TaskCategory,
    pub mode: ExecutionMode,
    pub default_instruction: Option<String>,
    pub default_config: Option<TaskConfigPatch>,
    pub handler: Option<Arc<dyn TaskHandler>>,
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: TaskCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            mode: ExecutionMode::Async,
            default_instruction: None,
            default_config: None,
            handler: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.default_instruction = Some(instruction.into());
        self
    }

    pub fn with_config(mut self, config: TaskConfigPatch) -> Self {
        self.default_config = Some(config);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("mode", &self.mode)
            .field("default_instruction", &self.default_instruction)
            .field("default_config", &self.default_config)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

/// Task metadata as persisted in the `tasks` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTask {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: TaskCategory,
    pub active: bool,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub config: TaskConfigPatch,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedTask {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: TaskCategory) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            category,
            active: true,
            instruction: None,
            config: TaskConfigPatch::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_config(mut self, config: TaskConfigPatch) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskFilter {
    pub category: Option<TaskCategory>,
    pub active: Option<bool>,
}

impl TaskFilter {
    pub fn matches(&self, task: &PersistedTask) -> bool {
        self.category.map_or(true, |c| c == task.category)
            && self.active.map_or(true, |a| a == task.active)
    }
}

/// Aggregated execution statistics for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub task_id: TaskId,
    pub total_executions: u64,
    pub successful: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub avg_duration_ms: Option<u64>,
    pub total_tokens: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
}

/// Immutable per-invocation bundle passed to a handler
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub trigger_source: TriggerSource,
    pub correlation_ids: CorrelationIds,
    pub input: Payload,
    pub store: Arc<dyn Store>,
    pub instruction: Option<String>,
    pub config: TaskConfig,
    pub events: EventEmitter,
}

impl ExecutionContext {
    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&serde_json::Value, TaskError> {
        self.input
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| TaskError::MissingInput(name.to_string()))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, TaskError> {
        self.require_input(name)?
            .as_str()
            .ok_or_else(|| TaskError::InvalidInput {
                field: name.to_string(),
                expected: "string".to_string(),
            })
    }

    pub fn input_str(&self, name: &str) -> Option<&str> {
        self.input.get(name).and_then(|v| v.as_str())
    }

    /// Correlation id first, then a same-named input field
    pub fn correlation(&self, key: &str) -> Option<&str> {
        self.correlation_ids
            .get(key)
            .map(String::as_str)
            .or_else(|| self.input_str(key))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("task_id", &self.task_id)
            .field("trigger_source", &self.trigger_source)
            .field("correlation_ids", &self.correlation_ids)
            .field("input", &self.input)
            .field("instruction", &self.instruction)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Outcome of exactly one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExecutionResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            execution_id: None,
            output: Some(output),
            error: None,
            error_code: None,
            tokens_used: None,
            warnings: Vec::new(),
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            execution_id: None,
            output: None,
            error: Some(message.into()),
            error_code: Some(code),
            tokens_used: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_execution_id(mut self, id: ExecutionId) -> Self {
        self.execution_id = Some(id);
        self
    }
}
