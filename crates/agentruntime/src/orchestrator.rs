use crate::executor::TaskRunner;
use agentcore::{
    EngineError, EngineEvent, ErrorPolicy, EventBus, ExecuteTaskRequest, ExecutionId,
    ExecutionResult, ExecutionStatus, StepAuditEntry, Store, StoreError, TriggerSource,
    WorkflowContext, WorkflowDefinition, WorkflowExecutionRecord, WorkflowResult, WorkflowStatus,
    WorkflowStep, WorkflowTrigger, WorkflowUpdate,
};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Partition steps into execution groups.
///
/// Steps sharing a `parallel` tag form one group; untagged steps each form
/// their own. Groups are ordered by where their first step appears, and
/// steps keep definition order inside a group.
pub fn partition_steps(steps: &[WorkflowStep]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut tagged: HashMap<&str, usize> = HashMap::new();

    for (index, step) in steps.iter().enumerate() {
        match step.parallel.as_deref() {
            Some(tag) => match tagged.get(tag) {
                Some(&group) => groups[group].push(index),
                None => {
                    tagged.insert(tag, groups.len());
                    groups.push(vec![index]);
                }
            },
            None => groups.push(vec![index]),
        }
    }

    groups
}

enum StepOutcome {
    Skipped,
    Executed(ExecutionResult),
}

enum RunOutcome {
    Finished,
    Paused,
}

/// Runs registered workflows in response to trigger events
pub struct Orchestrator {
    runner: Arc<dyn TaskRunner>,
    store: Arc<dyn Store>,
    events: EventBus,
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn TaskRunner>, store: Arc<dyn Store>, events: EventBus) -> Self {
        Self {
            runner,
            store,
            events,
            workflows: HashMap::new(),
        }
    }

    /// Register a workflow; a later registration for the same id replaces it
    pub fn register_workflow(&mut self, definition: WorkflowDefinition) {
        tracing::info!(
            workflow_id = %definition.id,
            trigger = %definition.trigger_event,
            steps = definition.steps.len(),
            "Registering workflow"
        );
        self.workflows
            .insert(definition.id.clone(), Arc::new(definition));
    }

    pub fn workflow(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(workflow_id).cloned()
    }

    pub fn list_workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut all: Vec<_> = self.workflows.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Run a workflow to completion.
    ///
    /// Errors are returned only before the run starts (unknown workflow,
    /// trigger mismatch, audit record insert); step failures are reported
    /// through the result.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        trigger: WorkflowTrigger,
    ) -> Result<WorkflowResult, EngineError> {
        let definition = self
            .workflow(workflow_id)
            .ok_or_else(|| EngineError::not_found("Workflow", workflow_id))?;

        if trigger.event != definition.trigger_event {
            return Err(EngineError::TriggerMismatch {
                expected: definition.trigger_event.clone(),
                actual: trigger.event,
            });
        }

        let execution_id = ExecutionId::new_v4();
        let record = WorkflowExecutionRecord::pending(execution_id, &definition.id, &trigger);
        if let Err(e) = self.store.insert_workflow_execution(&record).await {
            tracing::error!(workflow_id, error = %e, "Failed to create workflow execution record");
            return Err(e.into());
        }

        let start = Instant::now();
        self.write_progress(execution_id, WorkflowUpdate::status(WorkflowStatus::Running))
            .await;
        self.events.emit(EngineEvent::WorkflowStarted {
            execution_id,
            workflow_id: definition.id.clone(),
            event: trigger.event.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(%execution_id, workflow_id, event = %trigger.event, "Starting workflow");

        let mut ctx = WorkflowContext::new(definition.id.clone(), execution_id, &trigger);
        let mut audit: Vec<StepAuditEntry> = Vec::new();

        let (status, error) = match self.run_groups(&definition, &mut ctx, &mut audit).await {
            Ok(RunOutcome::Finished) => (WorkflowStatus::Completed, None),
            Ok(RunOutcome::Paused) => (WorkflowStatus::Paused, None),
            Err(message) => {
                tracing::error!(%execution_id, workflow_id, "Workflow failed: {}", message);
                (WorkflowStatus::Failed, Some(message))
            }
        };

        let completed_at = Utc::now();
        let final_update = WorkflowUpdate {
            status: Some(status),
            current_step: None,
            steps: Some(audit.clone()),
            context: Some(ctx.shared.clone()),
            error: error.clone(),
            completed_at: (status != WorkflowStatus::Paused).then_some(completed_at),
        };
        self.write_progress(execution_id, final_update).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        self.events.emit(EngineEvent::WorkflowFinished {
            execution_id,
            workflow_id: definition.id.clone(),
            status,
            duration_ms,
            timestamp: completed_at,
        });
        tracing::info!(%execution_id, workflow_id, %status, duration_ms, "Workflow finished");

        Ok(WorkflowResult {
            execution_id,
            workflow_id: definition.id.clone(),
            status,
            completed_steps: audit
                .iter()
                .filter(|entry| entry.status == ExecutionStatus::Completed)
                .count(),
            total_steps: definition.steps.len(),
            step_results: ctx.step_results,
            error,
            started_at: record.started_at,
            completed_at,
        })
    }

    /// Group loop. `Err` carries the message of a required-step failure
    /// under the `stop` policy.
    async fn run_groups(
        &self,
        definition: &WorkflowDefinition,
        ctx: &mut WorkflowContext,
        audit: &mut Vec<StepAuditEntry>,
    ) -> Result<RunOutcome, String> {
        for (group_index, group) in partition_steps(&definition.steps).iter().enumerate() {
            if self.pause_requested(ctx.execution_id).await {
                tracing::info!(execution_id = %ctx.execution_id, group = group_index, "Workflow paused");
                return Ok(RunOutcome::Paused);
            }

            ctx.current_group = group_index;
            // Same-group steps see the context as it was when the group started
            let snapshot = ctx.clone();

            let mut running: FuturesUnordered<_> = group
                .iter()
                .map(|&index| {
                    let step = &definition.steps[index];
                    let snapshot = &snapshot;
                    async move { (index, self.run_step(step, snapshot).await) }
                })
                .collect();

            // Callbacks run only once every step in the group has settled
            let mut settled = Vec::with_capacity(group.len());
            while let Some((index, outcome)) = running.next().await {
                settled.push((index, outcome, Utc::now()));
            }
            drop(running);

            let mut failures: Vec<(usize, String)> = Vec::new();
            for (index, outcome, settled_at) in settled {
                let step = &definition.steps[index];
                if let Some(error) = self
                    .settle_step(step, group_index, outcome, settled_at, ctx, audit)
                    .await
                {
                    failures.push((index, error));
                }
            }

            // Report in definition order regardless of settle order
            failures.sort_by_key(|(index, _)| *index);
            for (index, error) in &failures {
                let step = &definition.steps[*index];
                if !step.required {
                    continue;
                }
                match definition.on_error {
                    ErrorPolicy::Stop => {
                        return Err(format!("Required step '{}' failed: {}", step.task_id, error));
                    }
                    ErrorPolicy::Continue => {
                        tracing::warn!(
                            execution_id = %ctx.execution_id,
                            task_id = %step.task_id,
                            "Required step failed, continuing: {}",
                            error
                        );
                    }
                }
            }

            self.write_progress(
                ctx.execution_id,
                WorkflowUpdate {
                    current_step: Some(group_index + 1),
                    steps: Some(audit.clone()),
                    ..Default::default()
                },
            )
            .await;
        }

        Ok(RunOutcome::Finished)
    }

    async fn run_step(&self, step: &WorkflowStep, ctx: &WorkflowContext) -> StepOutcome {
        if !step.condition.evaluate(ctx).await {
            return StepOutcome::Skipped;
        }

        let input = match step.input.build(ctx).await {
            Ok(input) => input,
            Err(e) => {
                return StepOutcome::Executed(ExecutionResult::failure(
                    e.code(),
                    format!("Failed to build input: {}", e),
                ))
            }
        };

        let request = ExecuteTaskRequest::new(step.task_id.clone(), TriggerSource::Workflow)
            .with_input(input)
            .with_correlation_ids(ctx.correlation_ids.clone())
            .triggered_by(format!("workflow:{}", ctx.workflow_id));

        StepOutcome::Executed(self.runner.execute_task(request).await)
    }

    /// Record one settled step; returns the error message if it failed
    async fn settle_step(
        &self,
        step: &WorkflowStep,
        group: usize,
        outcome: StepOutcome,
        settled_at: DateTime<Utc>,
        ctx: &mut WorkflowContext,
        audit: &mut Vec<StepAuditEntry>,
    ) -> Option<String> {
        let (result, status) = match outcome {
            StepOutcome::Skipped => {
                tracing::info!(task_id = %step.task_id, "Step condition not met, skipping");
                let skipped = ExecutionResult::success(serde_json::json!({ "skipped": true }));
                audit.push(StepAuditEntry {
                    task_id: step.task_id.clone(),
                    group,
                    status: ExecutionStatus::Cancelled,
                    execution_id: None,
                    output: skipped.output.clone(),
                    error: None,
                    settled_at,
                });
                self.emit_settled(ctx, step, group, ExecutionStatus::Cancelled);
                ctx.step_results.insert(step.task_id.clone(), skipped);
                return None;
            }
            StepOutcome::Executed(result) => {
                let status = if result.success {
                    ExecutionStatus::Completed
                } else {
                    ExecutionStatus::Failed
                };
                (result, status)
            }
        };

        audit.push(StepAuditEntry {
            task_id: step.task_id.clone(),
            group,
            status,
            execution_id: result.execution_id,
            output: result.output.clone(),
            error: result.error.clone(),
            settled_at,
        });
        self.emit_settled(ctx, step, group, status);

        if result.success {
            if let Some(output) = &result.output {
                ctx.shared
                    .insert(WorkflowContext::output_key(&step.task_id), output.clone());
            }
        }
        ctx.step_results.insert(step.task_id.clone(), result.clone());

        if let Some(callback) = &step.on_complete {
            if let Err(e) = callback.on_complete(&result, ctx).await {
                tracing::warn!(task_id = %step.task_id, "Step completion callback failed: {}", e);
            }
        }

        if result.success {
            None
        } else {
            Some(
                result
                    .error
                    .unwrap_or_else(|| "step reported failure without a message".to_string()),
            )
        }
    }

    fn emit_settled(
        &self,
        ctx: &WorkflowContext,
        step: &WorkflowStep,
        group: usize,
        status: ExecutionStatus,
    ) {
        self.events.emit(EngineEvent::StepSettled {
            execution_id: ctx.execution_id,
            workflow_id: ctx.workflow_id.clone(),
            task_id: step.task_id.clone(),
            group,
            status,
            timestamp: Utc::now(),
        });
    }

    async fn pause_requested(&self, execution_id: ExecutionId) -> bool {
        match self.store.get_workflow_execution(execution_id).await {
            Ok(record) => record.status == WorkflowStatus::Paused,
            Err(e) => {
                tracing::warn!(%execution_id, error = %e, "Could not read workflow status");
                false
            }
        }
    }

    /// Audit writes during a run are best-effort
    async fn write_progress(&self, execution_id: ExecutionId, update: WorkflowUpdate) {
        if let Err(e) = self
            .store
            .update_workflow_execution(execution_id, &update, None)
            .await
        {
            tracing::warn!(%execution_id, error = %e, "Failed to persist workflow progress");
        }
    }

    pub async fn get_workflow_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<WorkflowExecutionRecord, EngineError> {
        self.store
            .get_workflow_execution(execution_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => {
                    EngineError::not_found("Workflow execution", execution_id.to_string())
                }
                other => EngineError::Storage(other),
            })
    }

    /// Advisory pause; returns whether the record changed. A run notices the
    /// pause before starting its next group. A pause that lands while the
    /// last group is running is overwritten by the run's final status, since
    /// no group is left to skip.
    pub async fn pause_workflow(&self, execution_id: ExecutionId) -> Result<bool, EngineError> {
        let applied = self
            .store
            .update_workflow_execution(
                execution_id,
                &WorkflowUpdate::status(WorkflowStatus::Paused),
                Some(&WorkflowStatus::PAUSABLE[..]),
            )
            .await?;
        if applied {
            tracing::info!(%execution_id, "Workflow pause requested");
        }
        Ok(applied)
    }

    /// Start a new run from a paused one, seeded with its saved shared context
    pub async fn resume_workflow(
        &self,
        execution_id: ExecutionId,
    ) -> Result<WorkflowResult, EngineError> {
        let record = self.get_workflow_execution(execution_id).await?;
        if record.status != WorkflowStatus::Paused {
            return Err(EngineError::invalid_status(
                record.status,
                &[WorkflowStatus::Paused][..],
            ));
        }

        tracing::info!(%execution_id, workflow_id = %record.workflow_id, "Resuming workflow");
        let trigger = WorkflowTrigger {
            event: record.trigger_event,
            correlation_ids: record.correlation_ids,
            data: record.context,
        };
        self.execute_workflow(&record.workflow_id, trigger).await
    }

    /// Runs correlated with a resource, newest first; empty on storage error
    pub async fn get_workflows_for_resource(
        &self,
        kind: &str,
        id: &str,
    ) -> Vec<WorkflowExecutionRecord> {
        match self.store.list_workflow_executions(kind, id).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(kind, id, error = %e, "Failed to list workflow executions");
                Vec::new()
            }
        }
    }
}
