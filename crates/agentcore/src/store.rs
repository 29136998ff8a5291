use crate::execution::{ExecutionId, ExecutionRecord, ExecutionStatus, ExecutionUpdate};
use crate::workflow::{WorkflowExecutionRecord, WorkflowStatus, WorkflowUpdate};
use crate::{Payload, PersistedTask, StoreError, TaskConfigPatch, TaskFilter, TaskMetrics};
use async_trait::async_trait;

/// Storage collaborator over the `tasks`, `task-executions` and
/// `workflow-executions` collections plus free-form domain documents.
///
/// Single-row fetches return [`StoreError::NotFound`] for a missing row.
/// Updates take an optional status set; when given, the update only applies
/// if the row's current status is in that set, and the return value reports
/// whether it applied.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_task(&self, task_id: &str) -> Result<Option<PersistedTask>, StoreError>;

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<PersistedTask>, StoreError>;

    /// Metrics for one task, or every task when `task_id` is `None`
    async fn task_metrics(&self, task_id: Option<&str>) -> Result<Vec<TaskMetrics>, StoreError>;

    async fn set_task_active(&self, task_id: &str, active: bool) -> Result<(), StoreError>;

    async fn patch_task_config(
        &self,
        task_id: &str,
        patch: &TaskConfigPatch,
    ) -> Result<(), StoreError>;

    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    async fn get_execution(&self, id: ExecutionId) -> Result<ExecutionRecord, StoreError>;

    async fn update_execution(
        &self,
        id: ExecutionId,
        update: &ExecutionUpdate,
        only_if: Option<&[ExecutionStatus]>,
    ) -> Result<bool, StoreError>;

    async fn insert_workflow_execution(
        &self,
        record: &WorkflowExecutionRecord,
    ) -> Result<(), StoreError>;

    async fn get_workflow_execution(
        &self,
        id: ExecutionId,
    ) -> Result<WorkflowExecutionRecord, StoreError>;

    async fn update_workflow_execution(
        &self,
        id: ExecutionId,
        update: &WorkflowUpdate,
        only_if: Option<&[WorkflowStatus]>,
    ) -> Result<bool, StoreError>;

    /// Workflow runs whose correlation id `kind` equals `id`, newest first
    async fn list_workflow_executions(
        &self,
        kind: &str,
        id: &str,
    ) -> Result<Vec<WorkflowExecutionRecord>, StoreError>;

    async fn get_document(&self, collection: &str, id: &str)
        -> Result<serde_json::Value, StoreError>;

    /// Documents whose top-level fields equal every entry of `filter`
    async fn query_documents(
        &self,
        collection: &str,
        filter: &Payload,
    ) -> Result<Vec<serde_json::Value>, StoreError>;
}
