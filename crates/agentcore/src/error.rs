use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable, caller-facing error codes carried on failed results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    Inactive,
    InvalidStatus,
    MissingInstruction,
    TriggerMismatch,
    ExternalServiceError,
    StorageError,
    ValidationError,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Inactive => "INACTIVE",
            ErrorCode::InvalidStatus => "INVALID_STATUS",
            ErrorCode::MissingInstruction => "MISSING_INSTRUCTION",
            ErrorCode::TriggerMismatch => "TRIGGER_MISMATCH",
            ErrorCode::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Task '{0}' is not active")]
    Inactive(String),

    #[error("Invalid status '{current}', allowed: {}", allowed.join(", "))]
    InvalidStatus {
        current: String,
        allowed: Vec<String>,
    },

    #[error("Task '{0}' has no handler and no instruction text")]
    MissingInstruction(String),

    #[error("Trigger event '{actual}' does not match workflow trigger '{expected}'")]
    TriggerMismatch { expected: String, actual: String },

    #[error("External service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task handler aborted: {0}")]
    HandlerAborted(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_status<S: fmt::Display>(current: S, allowed: &[S]) -> Self {
        EngineError::InvalidStatus {
            current: current.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::Inactive(_) => ErrorCode::Inactive,
            EngineError::InvalidStatus { .. } => ErrorCode::InvalidStatus,
            EngineError::MissingInstruction(_) => ErrorCode::MissingInstruction,
            EngineError::TriggerMismatch { .. } => ErrorCode::TriggerMismatch,
            EngineError::ExternalService { .. } => ErrorCode::ExternalServiceError,
            EngineError::Storage(StoreError::NotFound { .. }) => ErrorCode::NotFound,
            EngineError::Storage(_) => ErrorCode::StorageError,
            EngineError::Task(e) => e.code(),
            EngineError::Serialization(_) => ErrorCode::UnknownError,
            EngineError::HandlerAborted(_) => ErrorCode::UnknownError,
        }
    }

    /// Whether replaying the same invocation may succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            EngineError::ExternalService { .. } => true,
            EngineError::Storage(StoreError::Backend(_)) => true,
            EngineError::Task(TaskError::Generation(_)) => true,
            _ => false,
        }
    }
}

impl From<GenerationError> for EngineError {
    fn from(err: GenerationError) -> Self {
        EngineError::ExternalService {
            service: "text-generation".to_string(),
            message: err.to_string(),
        }
    }
}

/// Errors surfaced by the storage collaborator
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("No row in '{collection}' with id '{id}'")]
    NotFound { collection: String, id: String },

    #[error("Storage backend failure: {0}")]
    Backend(String),

    #[error("Stored value could not be decoded: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(collection: impl Into<String>, id: impl fmt::Display) -> Self {
        StoreError::NotFound {
            collection: collection.into(),
            id: id.to_string(),
        }
    }
}

/// Errors surfaced by the generative-text collaborator
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Text generation is not configured")]
    Unavailable,
}

/// Errors returned by hand-written task handlers
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input for '{field}': expected {expected}")]
    InvalidInput { field: String, expected: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Text generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TaskError::MissingInput(_) | TaskError::InvalidInput { .. } => {
                ErrorCode::ValidationError
            }
            TaskError::Store(StoreError::NotFound { .. }) => ErrorCode::NotFound,
            TaskError::Store(_) => ErrorCode::StorageError,
            TaskError::Generation(_) => ErrorCode::ExternalServiceError,
            TaskError::Failed(_) => ErrorCode::UnknownError,
        }
    }
}
