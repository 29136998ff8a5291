use crate::prompt;
use crate::registry::TaskRegistry;
use agentcore::{
    EngineError, EngineEvent, ErrorCode, EventBus, ExecuteTaskRequest, ExecutionContext,
    ExecutionId, ExecutionRecord, ExecutionResult, ExecutionStatus, ExecutionUpdate,
    GenerationRequest, StoreError, TaskConfig, TextGenerator,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs one task invocation; the orchestrator's seam onto the executor
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Never fails: every error is reported through the returned result
    async fn execute_task(&self, request: ExecuteTaskRequest) -> ExecutionResult;
}

/// Executes single task invocations with audit bookkeeping
pub struct Executor {
    registry: Arc<TaskRegistry>,
    generator: Arc<dyn TextGenerator>,
    events: EventBus,
    task_defaults: TaskConfig,
}

impl Executor {
    pub fn new(
        registry: Arc<TaskRegistry>,
        generator: Arc<dyn TextGenerator>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            generator,
            events,
            task_defaults: TaskConfig::default(),
        }
    }

    pub fn with_task_defaults(mut self, defaults: TaskConfig) -> Self {
        self.task_defaults = defaults;
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Run one invocation end to end.
    ///
    /// The execution record is created in `running` state before anything
    /// else; if that insert fails nothing further happens. The terminal
    /// update is best-effort and never replaces the computed result.
    pub async fn execute_task(&self, request: ExecuteTaskRequest) -> ExecutionResult {
        let execution_id = ExecutionId::new_v4();
        let store = self.registry.store();

        let record = ExecutionRecord::running(execution_id, &request);
        if let Err(e) = store.insert_execution(&record).await {
            tracing::error!(task_id = %request.task_id, error = %e, "Failed to create execution record");
            return ExecutionResult::failure(
                ErrorCode::StorageError,
                format!("Failed to create execution record: {}", e),
            );
        }

        self.events.emit(EngineEvent::TaskStarted {
            execution_id,
            task_id: request.task_id.clone(),
            trigger_source: request.trigger_source,
            timestamp: Utc::now(),
        });
        tracing::info!(%execution_id, task_id = %request.task_id, source = %request.trigger_source, "Executing task");

        let start = Instant::now();
        let result = match self.run(execution_id, &request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(%execution_id, task_id = %request.task_id, code = %e.code(), "Task failed: {}", e);
                ExecutionResult::failure(e.code(), e.to_string())
            }
        }
        .with_execution_id(execution_id);
        let duration_ms = start.elapsed().as_millis() as u64;

        let update = ExecutionUpdate::finished(&result, duration_ms);
        match store
            .update_execution(execution_id, &update, Some(&ExecutionStatus::CANCELLABLE[..]))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%execution_id, "Execution left its running state before completion; outcome not recorded");
            }
            Err(e) => {
                tracing::error!(%execution_id, error = %e, "Failed to record execution outcome");
            }
        }

        self.events.emit(EngineEvent::TaskFinished {
            execution_id,
            task_id: request.task_id.clone(),
            success: result.success,
            error_code: result.error_code,
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    async fn run(
        &self,
        execution_id: ExecutionId,
        request: &ExecuteTaskRequest,
    ) -> Result<ExecutionResult, EngineError> {
        let persisted = self
            .registry
            .fetch_persisted_task(&request.task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Task", &request.task_id))?;

        if !persisted.active {
            return Err(EngineError::Inactive(request.task_id.clone()));
        }

        let definition = self.registry.lookup(&request.task_id);
        let config = TaskConfig::merged(
            &self.task_defaults,
            Some(&persisted.config),
            definition.as_ref().and_then(|d| d.default_config.as_ref()),
        );
        let instruction = definition
            .as_ref()
            .and_then(|d| d.default_instruction.clone())
            .or(persisted.instruction);

        match definition.and_then(|d| d.handler.clone()) {
            Some(handler) => {
                let ctx = ExecutionContext {
                    execution_id,
                    task_id: request.task_id.clone(),
                    trigger_source: request.trigger_source,
                    correlation_ids: request.correlation_ids.clone(),
                    input: request.input.clone(),
                    store: Arc::clone(self.registry.store()),
                    instruction,
                    config,
                    events: self.events.create_emitter(execution_id, &request.task_id),
                };
                // A panicking handler surfaces as a join error
                let task = tokio::spawn(async move { handler.execute(ctx).await });
                match task.await {
                    Ok(result) => Ok(result?),
                    Err(e) => {
                        tracing::error!(%execution_id, task_id = %request.task_id, "Task handler aborted: {}", e);
                        Err(EngineError::HandlerAborted(e.to_string()))
                    }
                }
            }
            None => self.generate(request, instruction, &config).await,
        }
    }

    /// Fallback for tasks without a handler: instruction plus rendered input
    async fn generate(
        &self,
        request: &ExecuteTaskRequest,
        instruction: Option<String>,
        config: &TaskConfig,
    ) -> Result<ExecutionResult, EngineError> {
        let instruction = instruction
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| EngineError::MissingInstruction(request.task_id.clone()))?;

        let generation = self
            .generator
            .generate(GenerationRequest {
                prompt: prompt::build_prompt(&instruction, &request.input),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                model: config.model.clone(),
                timeout: Duration::from_secs(config.timeout_secs),
            })
            .await?;

        let output = prompt::parse_response(&generation.content);
        Ok(ExecutionResult::success(output).with_tokens(generation.tokens_used))
    }

    pub async fn get_execution(&self, id: ExecutionId) -> Result<ExecutionRecord, EngineError> {
        self.registry
            .store()
            .get_execution(id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => EngineError::not_found("Execution", id.to_string()),
                other => EngineError::Storage(other),
            })
    }

    /// Mark a pending or running execution cancelled. In-flight handlers are
    /// not interrupted.
    pub async fn cancel_execution(&self, id: ExecutionId) -> Result<ExecutionRecord, EngineError> {
        let mut record = self.get_execution(id).await?;
        if !ExecutionStatus::CANCELLABLE.contains(&record.status) {
            return Err(EngineError::invalid_status(
                record.status,
                &ExecutionStatus::CANCELLABLE[..],
            ));
        }

        let update = ExecutionUpdate::cancelled();
        let applied = self
            .registry
            .store()
            .update_execution(id, &update, Some(&ExecutionStatus::CANCELLABLE[..]))
            .await?;
        if !applied {
            // Completed between the read and the conditional write
            let current = self.get_execution(id).await?;
            return Err(EngineError::invalid_status(
                current.status,
                &ExecutionStatus::CANCELLABLE[..],
            ));
        }

        tracing::info!(execution_id = %id, "Execution cancelled");
        update.apply_to(&mut record);
        Ok(record)
    }

    /// Replay a failed execution as a brand-new invocation; the original
    /// record is left untouched
    pub async fn retry_execution(&self, id: ExecutionId) -> Result<ExecutionResult, EngineError> {
        let record = self.get_execution(id).await?;
        if !ExecutionStatus::RETRYABLE.contains(&record.status) {
            return Err(EngineError::invalid_status(
                record.status,
                &ExecutionStatus::RETRYABLE[..],
            ));
        }

        tracing::info!(execution_id = %id, task_id = %record.task_id, "Retrying execution");
        Ok(self.execute_task(record.to_request()).await)
    }
}

#[async_trait]
impl TaskRunner for Executor {
    async fn execute_task(&self, request: ExecuteTaskRequest) -> ExecutionResult {
        Executor::execute_task(self, request).await
    }
}
