use crate::execution::{ExecutionId, ExecutionStatus, TriggerSource};
use crate::workflow::WorkflowStatus;
use crate::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while tasks and workflows run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    TaskStarted {
        execution_id: ExecutionId,
        task_id: String,
        trigger_source: TriggerSource,
        timestamp: DateTime<Utc>,
    },
    TaskNote {
        execution_id: ExecutionId,
        task_id: String,
        level: NoteLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },
    TaskFinished {
        execution_id: ExecutionId,
        task_id: String,
        success: bool,
        error_code: Option<ErrorCode>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow_id: String,
        event: String,
        timestamp: DateTime<Utc>,
    },
    StepSettled {
        execution_id: ExecutionId,
        workflow_id: String,
        task_id: String,
        group: usize,
        status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
    WorkflowFinished {
        execution_id: ExecutionId,
        workflow_id: String,
        status: WorkflowStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteLevel {
    Info,
    Warning,
}

/// Event emitter handed to a task handler for its own progress notes
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    task_id: String,
    sender: broadcast::Sender<EngineEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        task_id: impl Into<String>,
        sender: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            execution_id,
            task_id: task_id.into(),
            sender,
        }
    }

    fn note(&self, level: NoteLevel, message: String) {
        let _ = self.sender.send(EngineEvent::TaskNote {
            execution_id: self.execution_id,
            task_id: self.task_id.clone(),
            level,
            message,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.note(NoteLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.note(NoteLevel::Warning, message.into());
    }
}

/// In-process event bus; sending with no subscribers is not an error
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, task_id: &str) -> EventEmitter {
        EventEmitter::new(execution_id, task_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
