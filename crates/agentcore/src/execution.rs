use crate::{ErrorCode, ExecutionResult, Payload, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Audit-only identifiers such as `listingId` or `sellerId`
pub type CorrelationIds = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Event,
    Schedule,
    Workflow,
    Api,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Event => "event",
            TriggerSource::Schedule => "schedule",
            TriggerSource::Workflow => "workflow",
            TriggerSource::Api => "api",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub const CANCELLABLE: [ExecutionStatus; 2] = [ExecutionStatus::Pending, ExecutionStatus::Running];
    pub const RETRYABLE: [ExecutionStatus; 1] = [ExecutionStatus::Failed];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The only entry point callers use to run a single task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteTaskRequest {
    pub task_id: TaskId,
    pub trigger_source: TriggerSource,
    #[serde(default)]
    pub input: Payload,
    #[serde(default)]
    pub correlation_ids: CorrelationIds,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

impl ExecuteTaskRequest {
    pub fn new(task_id: impl Into<String>, trigger_source: TriggerSource) -> Self {
        Self {
            task_id: task_id.into(),
            trigger_source,
            input: Payload::new(),
            correlation_ids: CorrelationIds::new(),
            triggered_by: None,
        }
    }

    pub fn with_input(mut self, input: Payload) -> Self {
        self.input = input;
        self
    }

    pub fn with_correlation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.correlation_ids.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_ids(mut self, ids: CorrelationIds) -> Self {
        self.correlation_ids = ids;
        self
    }

    pub fn triggered_by(mut self, who: impl Into<String>) -> Self {
        self.triggered_by = Some(who.into());
        self
    }
}

/// Persisted audit row for one invocation (`task-executions`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub task_id: TaskId,
    pub trigger_source: TriggerSource,
    #[serde(default)]
    pub triggered_by: Option<String>,
    #[serde(default)]
    pub correlation_ids: CorrelationIds,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub input: Payload,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<ErrorCode>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// A fresh record in `running` state for the given request
    pub fn running(id: ExecutionId, request: &ExecuteTaskRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            task_id: request.task_id.clone(),
            trigger_source: request.trigger_source,
            triggered_by: request.triggered_by.clone(),
            correlation_ids: request.correlation_ids.clone(),
            status: ExecutionStatus::Running,
            input: request.input.clone(),
            output: None,
            error: None,
            error_code: None,
            tokens_used: None,
            duration_ms: None,
            created_at: now,
            started_at: Some(now),
            completed_at: None,
        }
    }

    /// Rebuild the request that produced this record
    pub fn to_request(&self) -> ExecuteTaskRequest {
        ExecuteTaskRequest {
            task_id: self.task_id.clone(),
            trigger_source: self.trigger_source,
            input: self.input.clone(),
            correlation_ids: self.correlation_ids.clone(),
            triggered_by: self.triggered_by.clone(),
        }
    }
}

/// Partial update applied to an execution record; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub tokens_used: Option<u64>,
    pub duration_ms: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionUpdate {
    /// Terminal update mirroring a computed result
    pub fn finished(result: &ExecutionResult, duration_ms: u64) -> Self {
        Self {
            status: Some(if result.success {
                ExecutionStatus::Completed
            } else {
                ExecutionStatus::Failed
            }),
            output: result.output.clone(),
            error: result.error.clone(),
            error_code: result.error_code,
            tokens_used: result.tokens_used,
            duration_ms: Some(duration_ms),
            completed_at: Some(Utc::now()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: Some(ExecutionStatus::Cancelled),
            completed_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, record: &mut ExecutionRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(output) = &self.output {
            record.output = Some(output.clone());
        }
        if let Some(error) = &self.error {
            record.error = Some(error.clone());
        }
        if let Some(code) = self.error_code {
            record.error_code = Some(code);
        }
        if let Some(tokens) = self.tokens_used {
            record.tokens_used = Some(tokens);
        }
        if let Some(duration) = self.duration_ms {
            record.duration_ms = Some(duration);
        }
        if let Some(at) = self.completed_at {
            record.completed_at = Some(at);
        }
    }
}
