use agentcore::{
    ExecutionId, ExecutionRecord, ExecutionStatus, ExecutionUpdate, Payload, PersistedTask, Store,
    StoreError, TaskConfigPatch, TaskFilter, TaskMetrics, WorkflowExecutionRecord,
    WorkflowStatus, WorkflowUpdate,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

pub const TASKS: &str = "tasks";
pub const TASK_EXECUTIONS: &str = "task-executions";
pub const WORKFLOW_EXECUTIONS: &str = "workflow-executions";

#[derive(Default)]
struct Tables {
    tasks: BTreeMap<String, PersistedTask>,
    executions: HashMap<ExecutionId, ExecutionRecord>,
    workflows: HashMap<ExecutionId, WorkflowExecutionRecord>,
    documents: HashMap<String, BTreeMap<String, serde_json::Value>>,
}

/// In-process [`Store`] used by the CLI and tests
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_task(&self, task: PersistedTask) {
        self.tables.write().await.tasks.insert(task.id.clone(), task);
    }

    pub async fn put_document(
        &self,
        collection: impl Into<String>,
        id: impl Into<String>,
        document: serde_json::Value,
    ) {
        self.tables
            .write()
            .await
            .documents
            .entry(collection.into())
            .or_default()
            .insert(id.into(), document);
    }

    pub async fn executions_for(&self, task_id: &str) -> Vec<ExecutionRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .executions
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub async fn execution_count(&self) -> usize {
        self.tables.read().await.executions.len()
    }
}

fn metrics_for(task_id: &str, records: &[&ExecutionRecord]) -> TaskMetrics {
    let count = |status: ExecutionStatus| records.iter().filter(|r| r.status == status).count() as u64;
    let durations: Vec<u64> = records.iter().filter_map(|r| r.duration_ms).collect();
    TaskMetrics {
        task_id: task_id.to_string(),
        total_executions: records.len() as u64,
        successful: count(ExecutionStatus::Completed),
        failed: count(ExecutionStatus::Failed),
        cancelled: count(ExecutionStatus::Cancelled),
        avg_duration_ms: if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<u64>() / durations.len() as u64)
        },
        total_tokens: records.iter().filter_map(|r| r.tokens_used).sum(),
        last_executed_at: records.iter().map(|r| r.created_at).max(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_task(&self, task_id: &str) -> Result<Option<PersistedTask>, StoreError> {
        Ok(self.tables.read().await.tasks.get(task_id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<PersistedTask>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn task_metrics(&self, task_id: Option<&str>) -> Result<Vec<TaskMetrics>, StoreError> {
        let tables = self.tables.read().await;
        let task_ids: Vec<&str> = match task_id {
            Some(id) => vec![id],
            None => tables.tasks.keys().map(String::as_str).collect(),
        };
        Ok(task_ids
            .into_iter()
            .map(|id| {
                let records: Vec<&ExecutionRecord> =
                    tables.executions.values().filter(|r| r.task_id == id).collect();
                metrics_for(id, &records)
            })
            .collect())
    }

    async fn set_task_active(&self, task_id: &str, active: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::not_found(TASKS, task_id))?;
        task.active = active;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn patch_task_config(
        &self,
        task_id: &str,
        patch: &TaskConfigPatch,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::not_found(TASKS, task_id))?;
        task.config.merge(patch);
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.executions.contains_key(&record.id) {
            return Err(StoreError::Backend(format!(
                "duplicate key in '{}': {}",
                TASK_EXECUTIONS, record.id
            )));
        }
        tables.executions.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<ExecutionRecord, StoreError> {
        self.tables
            .read()
            .await
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(TASK_EXECUTIONS, id))
    }

    async fn update_execution(
        &self,
        id: ExecutionId,
        update: &ExecutionUpdate,
        only_if: Option<&[ExecutionStatus]>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .executions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(TASK_EXECUTIONS, id))?;
        if let Some(allowed) = only_if {
            if !allowed.contains(&record.status) {
                return Ok(false);
            }
        }
        update.apply_to(record);
        Ok(true)
    }

    async fn insert_workflow_execution(
        &self,
        record: &WorkflowExecutionRecord,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.workflows.contains_key(&record.id) {
            return Err(StoreError::Backend(format!(
                "duplicate key in '{}': {}",
                WORKFLOW_EXECUTIONS, record.id
            )));
        }
        tables.workflows.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_workflow_execution(
        &self,
        id: ExecutionId,
    ) -> Result<WorkflowExecutionRecord, StoreError> {
        self.tables
            .read()
            .await
            .workflows
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(WORKFLOW_EXECUTIONS, id))
    }

    async fn update_workflow_execution(
        &self,
        id: ExecutionId,
        update: &WorkflowUpdate,
        only_if: Option<&[WorkflowStatus]>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .workflows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(WORKFLOW_EXECUTIONS, id))?;
        if let Some(allowed) = only_if {
            if !allowed.contains(&record.status) {
                return Ok(false);
            }
        }
        update.apply_to(record);
        Ok(true)
    }

    async fn list_workflow_executions(
        &self,
        kind: &str,
        id: &str,
    ) -> Result<Vec<WorkflowExecutionRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .workflows
            .values()
            .filter(|r| r.correlation_ids.get(kind).map(String::as_str) == Some(id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<serde_json::Value, StoreError> {
        self.tables
            .read()
            .await
            .documents
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn query_documents(
        &self,
        collection: &str,
        filter: &Payload,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let tables = self.tables.read().await;
        let Some(docs) = tables.documents.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .values()
            .filter(|doc| {
                filter
                    .iter()
                    .all(|(key, expected)| doc.get(key) == Some(expected))
            })
            .cloned()
            .collect())
    }
}
