#![allow(dead_code)]

use agentcore::{
    ExecuteTaskRequest, ExecutionContext, ExecutionId, ExecutionRecord, ExecutionResult,
    ExecutionStatus, ExecutionUpdate, Generation, GenerationError, GenerationRequest, Payload,
    PersistedTask, Store, StoreError, TaskConfigPatch, TaskError, TaskFilter, TaskHandler,
    TaskMetrics, TextGenerator, WorkflowExecutionRecord, WorkflowStatus, WorkflowUpdate,
};
use agentruntime::{MemoryStore, TaskRunner};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

pub fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

/// Wraps a [`MemoryStore`] with call counters and failure switches
#[derive(Default)]
pub struct TestStore {
    pub inner: MemoryStore,
    pub fail_execution_insert: AtomicBool,
    pub fail_execution_update: AtomicBool,
    pub fail_workflow_insert: AtomicBool,
    pub fail_workflow_update: AtomicBool,
    pub fail_workflow_list: AtomicBool,
    pub get_task_calls: AtomicUsize,
    pub list_task_calls: AtomicUsize,
    pub metrics_calls: AtomicUsize,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Backend("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for TestStore {
    async fn get_task(&self, task_id: &str) -> Result<Option<PersistedTask>, StoreError> {
        self.get_task_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_task(task_id).await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<PersistedTask>, StoreError> {
        self.list_task_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_tasks(filter).await
    }

    async fn task_metrics(&self, task_id: Option<&str>) -> Result<Vec<TaskMetrics>, StoreError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.task_metrics(task_id).await
    }

    async fn set_task_active(&self, task_id: &str, active: bool) -> Result<(), StoreError> {
        self.inner.set_task_active(task_id, active).await
    }

    async fn patch_task_config(
        &self,
        task_id: &str,
        patch: &TaskConfigPatch,
    ) -> Result<(), StoreError> {
        self.inner.patch_task_config(task_id, patch).await
    }

    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        Self::check(&self.fail_execution_insert)?;
        self.inner.insert_execution(record).await
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<ExecutionRecord, StoreError> {
        self.inner.get_execution(id).await
    }

    async fn update_execution(
        &self,
        id: ExecutionId,
        update: &ExecutionUpdate,
        only_if: Option<&[ExecutionStatus]>,
    ) -> Result<bool, StoreError> {
        Self::check(&self.fail_execution_update)?;
        self.inner.update_execution(id, update, only_if).await
    }

    async fn insert_workflow_execution(
        &self,
        record: &WorkflowExecutionRecord,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_workflow_insert)?;
        self.inner.insert_workflow_execution(record).await
    }

    async fn get_workflow_execution(
        &self,
        id: ExecutionId,
    ) -> Result<WorkflowExecutionRecord, StoreError> {
        self.inner.get_workflow_execution(id).await
    }

    async fn update_workflow_execution(
        &self,
        id: ExecutionId,
        update: &WorkflowUpdate,
        only_if: Option<&[WorkflowStatus]>,
    ) -> Result<bool, StoreError> {
        Self::check(&self.fail_workflow_update)?;
        self.inner.update_workflow_execution(id, update, only_if).await
    }

    async fn list_workflow_executions(
        &self,
        kind: &str,
        id: &str,
    ) -> Result<Vec<WorkflowExecutionRecord>, StoreError> {
        Self::check(&self.fail_workflow_list)?;
        self.inner.list_workflow_executions(kind, id).await
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<serde_json::Value, StoreError> {
        self.inner.get_document(collection, id).await
    }

    async fn query_documents(
        &self,
        collection: &str,
        filter: &Payload,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        self.inner.query_documents(collection, filter).await
    }
}

/// Text generator returning a fixed response and recording every request
pub struct ScriptedGenerator {
    response: Result<Generation, GenerationError>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn replying(content: &str, tokens_used: u64) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(Generation {
                content: content.to_string(),
                tokens_used,
            }),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: GenerationError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(error),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        self.requests.lock().unwrap().push(request);
        self.response.clone()
    }
}

/// Handler that counts calls, remembers the last context and replies from a script
pub struct CountingHandler {
    reply: Box<dyn Fn(&ExecutionContext) -> Result<ExecutionResult, TaskError> + Send + Sync>,
    pub calls: AtomicUsize,
    pub last_context: Mutex<Option<ExecutionContext>>,
}

impl CountingHandler {
    pub fn new(
        reply: impl Fn(&ExecutionContext) -> Result<ExecutionResult, TaskError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            last_context: Mutex::new(None),
        })
    }

    pub fn succeeding(output: serde_json::Value) -> Arc<Self> {
        Self::new(move |_| Ok(ExecutionResult::success(output.clone())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for CountingHandler {
    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.reply)(&ctx);
        *self.last_context.lock().unwrap() = Some(ctx);
        reply
    }
}

/// Stand-in for the executor: records requests and replies per task id
#[derive(Default)]
pub struct MockRunner {
    replies: HashMap<String, ExecutionResult>,
    delays: HashMap<String, Duration>,
    pub requests: Mutex<Vec<ExecuteTaskRequest>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, task_id: &str, result: ExecutionResult) -> Self {
        self.replies.insert(task_id.to_string(), result);
        self
    }

    pub fn delay(mut self, task_id: &str, delay: Duration) -> Self {
        self.delays.insert(task_id.to_string(), delay);
        self
    }

    pub fn invoked(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.task_id.clone())
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn request_for(&self, task_id: &str) -> Option<ExecuteTaskRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.task_id == task_id)
            .cloned()
    }
}

#[async_trait]
impl TaskRunner for MockRunner {
    async fn execute_task(&self, request: ExecuteTaskRequest) -> ExecutionResult {
        self.requests.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&request.task_id) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.replies
            .get(&request.task_id)
            .cloned()
            .unwrap_or_else(|| ExecutionResult::success(serde_json::json!({ "ok": true })))
            .with_execution_id(ExecutionId::new_v4())
    }
}
