use crate::execution::{CorrelationIds, ExecutionId, ExecutionStatus};
use crate::{ExecutionResult, Payload, TaskError, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type WorkflowId = String;

/// Complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger_event: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

impl WorkflowDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        trigger_event: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            trigger_event: trigger_event.into(),
            steps: Vec::new(),
            on_error: ErrorPolicy::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    #[default]
    Stop,
    Continue,
}

/// One task reference within a workflow
#[derive(Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub task_id: TaskId,
    #[serde(default)]
    pub condition: StepCondition,
    #[serde(default)]
    pub input: InputMapping,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<String>,
    #[serde(skip)]
    pub on_complete: Option<Arc<dyn StepCallback>>,
}

fn default_required() -> bool {
    true
}

impl WorkflowStep {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            condition: StepCondition::Always,
            input: InputMapping::PassThrough,
            required: true,
            parallel: None,
            on_complete: None,
        }
    }

    pub fn when(mut self, condition: StepCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_input(mut self, input: InputMapping) -> Self {
        self.input = input;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn in_group(mut self, tag: impl Into<String>) -> Self {
        self.parallel = Some(tag.into());
        self
    }

    pub fn on_complete(mut self, callback: impl StepCallback + 'static) -> Self {
        self.on_complete = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("task_id", &self.task_id)
            .field("condition", &self.condition)
            .field("input", &self.input)
            .field("required", &self.required)
            .field("parallel", &self.parallel)
            .field("on_complete", &self.on_complete.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Predicate strategy for steps that need arbitrary logic
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    async fn evaluate(&self, ctx: &WorkflowContext) -> bool;
}

#[async_trait]
impl<F> ConditionEvaluator for F
where
    F: Fn(&WorkflowContext) -> bool + Send + Sync,
{
    async fn evaluate(&self, ctx: &WorkflowContext) -> bool {
        self(ctx)
    }
}

/// Input strategy for steps that need arbitrary logic
#[async_trait]
pub trait InputBuilder: Send + Sync {
    async fn build(&self, ctx: &WorkflowContext) -> Result<Payload, TaskError>;
}

#[async_trait]
impl<F> InputBuilder for F
where
    F: Fn(&WorkflowContext) -> Result<Payload, TaskError> + Send + Sync,
{
    async fn build(&self, ctx: &WorkflowContext) -> Result<Payload, TaskError> {
        self(ctx)
    }
}

/// Runs after a step settles; errors are logged and never abort the workflow
#[async_trait]
pub trait StepCallback: Send + Sync {
    async fn on_complete(
        &self,
        result: &ExecutionResult,
        ctx: &mut WorkflowContext,
    ) -> Result<(), TaskError>;
}

#[async_trait]
impl<F> StepCallback for F
where
    F: Fn(&ExecutionResult, &mut WorkflowContext) -> Result<(), TaskError> + Send + Sync,
{
    async fn on_complete(
        &self,
        result: &ExecutionResult,
        ctx: &mut WorkflowContext,
    ) -> Result<(), TaskError> {
        self(result, ctx)
    }
}

/// When a step runs
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepCondition {
    #[default]
    Always,
    /// Shared context holds a non-null value under `key`
    Present { key: String },
    /// Shared context value under `key` equals `value`
    Equals {
        key: String,
        value: serde_json::Value,
    },
    /// An earlier step for `task_id` finished successfully
    StepSucceeded { task_id: TaskId },
    #[serde(skip)]
    Custom(Arc<dyn ConditionEvaluator>),
}

impl StepCondition {
    pub fn custom(evaluator: impl ConditionEvaluator + 'static) -> Self {
        StepCondition::Custom(Arc::new(evaluator))
    }

    pub async fn evaluate(&self, ctx: &WorkflowContext) -> bool {
        match self {
            StepCondition::Always => true,
            StepCondition::Present { key } => {
                ctx.shared.get(key).map_or(false, |v| !v.is_null())
            }
            StepCondition::Equals { key, value } => ctx.shared.get(key) == Some(value),
            StepCondition::StepSucceeded { task_id } => ctx
                .step_results
                .get(task_id)
                .map_or(false, |r| r.success),
            StepCondition::Custom(evaluator) => evaluator.evaluate(ctx).await,
        }
    }
}

impl fmt::Debug for StepCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepCondition::Always => f.write_str("Always"),
            StepCondition::Present { key } => f.debug_struct("Present").field("key", key).finish(),
            StepCondition::Equals { key, value } => f
                .debug_struct("Equals")
                .field("key", key)
                .field("value", value)
                .finish(),
            StepCondition::StepSucceeded { task_id } => f
                .debug_struct("StepSucceeded")
                .field("task_id", task_id)
                .finish(),
            StepCondition::Custom(_) => f.write_str("Custom(<evaluator>)"),
        }
    }
}

/// How a step's input is built from the workflow context
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMapping {
    /// Shallow copy of the shared context
    #[default]
    PassThrough,
    /// Only the listed shared-context keys
    Select { keys: Vec<String> },
    /// Shared context overlaid with fixed values
    Merge { values: Payload },
    /// The object output of an earlier step
    StepOutput { task_id: TaskId },
    #[serde(skip)]
    Custom(Arc<dyn InputBuilder>),
}

impl InputMapping {
    pub fn custom(builder: impl InputBuilder + 'static) -> Self {
        InputMapping::Custom(Arc::new(builder))
    }

    pub async fn build(&self, ctx: &WorkflowContext) -> Result<Payload, TaskError> {
        match self {
            InputMapping::PassThrough => Ok(ctx.shared.clone()),
            InputMapping::Select { keys } => Ok(keys
                .iter()
                .filter_map(|k| ctx.shared.get(k).map(|v| (k.clone(), v.clone())))
                .collect()),
            InputMapping::Merge { values } => {
                let mut input = ctx.shared.clone();
                for (k, v) in values {
                    input.insert(k.clone(), v.clone());
                }
                Ok(input)
            }
            InputMapping::StepOutput { task_id } => {
                match ctx.step_results.get(task_id).and_then(|r| r.output.as_ref()) {
                    Some(serde_json::Value::Object(map)) => Ok(map.clone()),
                    Some(_) => Err(TaskError::InvalidInput {
                        field: format!("{task_id} output"),
                        expected: "object".to_string(),
                    }),
                    None => Err(TaskError::MissingInput(format!("{task_id} output"))),
                }
            }
            InputMapping::Custom(builder) => builder.build(ctx).await,
        }
    }
}

impl fmt::Debug for InputMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMapping::PassThrough => f.write_str("PassThrough"),
            InputMapping::Select { keys } => f.debug_struct("Select").field("keys", keys).finish(),
            InputMapping::Merge { values } => {
                f.debug_struct("Merge").field("values", values).finish()
            }
            InputMapping::StepOutput { task_id } => f
                .debug_struct("StepOutput")
                .field("task_id", task_id)
                .finish(),
            InputMapping::Custom(_) => f.write_str("Custom(<builder>)"),
        }
    }
}

/// The event that starts a workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub event: String,
    #[serde(default)]
    pub correlation_ids: CorrelationIds,
    #[serde(default)]
    pub data: Payload,
}

impl WorkflowTrigger {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            correlation_ids: CorrelationIds::new(),
            data: Payload::new(),
        }
    }

    pub fn with_correlation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.correlation_ids.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }
}

/// Mutable state threaded through one workflow run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowContext {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub event: String,
    pub payload: Payload,
    pub correlation_ids: CorrelationIds,
    pub current_group: usize,
    pub step_results: BTreeMap<TaskId, ExecutionResult>,
    pub shared: Payload,
}

impl WorkflowContext {
    pub fn new(workflow_id: impl Into<String>, execution_id: ExecutionId, trigger: &WorkflowTrigger) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id,
            event: trigger.event.clone(),
            payload: trigger.data.clone(),
            correlation_ids: trigger.correlation_ids.clone(),
            current_group: 0,
            step_results: BTreeMap::new(),
            shared: trigger.data.clone(),
        }
    }

    /// Shared-context key under which a task's output is published
    pub fn output_key(task_id: &str) -> String {
        format!("{task_id}_output")
    }

    pub fn output_of(&self, task_id: &str) -> Option<&serde_json::Value> {
        self.shared.get(&Self::output_key(task_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl WorkflowStatus {
    pub const PAUSABLE: [WorkflowStatus; 2] = [WorkflowStatus::Pending, WorkflowStatus::Running];

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Per-step audit entry on a workflow execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAuditEntry {
    pub task_id: TaskId,
    pub group: usize,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub settled_at: DateTime<Utc>,
}

/// Persisted audit row for one workflow run (`workflow-executions`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionRecord {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub trigger_event: String,
    #[serde(default)]
    pub correlation_ids: CorrelationIds,
    pub status: WorkflowStatus,
    pub current_step: usize,
    #[serde(default)]
    pub steps: Vec<StepAuditEntry>,
    #[serde(default)]
    pub context: Payload,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecutionRecord {
    pub fn pending(id: ExecutionId, workflow_id: impl Into<String>, trigger: &WorkflowTrigger) -> Self {
        Self {
            id,
            workflow_id: workflow_id.into(),
            trigger_event: trigger.event.clone(),
            correlation_ids: trigger.correlation_ids.clone(),
            status: WorkflowStatus::Pending,
            current_step: 0,
            steps: Vec::new(),
            context: trigger.data.clone(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Partial update applied to a workflow execution record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowUpdate {
    pub status: Option<WorkflowStatus>,
    pub current_step: Option<usize>,
    pub steps: Option<Vec<StepAuditEntry>>,
    pub context: Option<Payload>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowUpdate {
    pub fn status(status: WorkflowStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, record: &mut WorkflowExecutionRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(step) = self.current_step {
            record.current_step = step;
        }
        if let Some(steps) = &self.steps {
            record.steps = steps.clone();
        }
        if let Some(context) = &self.context {
            record.context = context.clone();
        }
        if let Some(error) = &self.error {
            record.error = Some(error.clone());
        }
        if let Some(at) = self.completed_at {
            record.completed_at = Some(at);
        }
    }
}

/// Outcome of one workflow run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub step_results: BTreeMap<TaskId, ExecutionResult>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl WorkflowResult {
    pub fn success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with(shared: serde_json::Value) -> WorkflowContext {
        let trigger = WorkflowTrigger::new("listing.created")
            .with_data(shared.as_object().cloned().unwrap_or_default());
        WorkflowContext::new("wf", ExecutionId::new_v4(), &trigger)
    }

    #[tokio::test]
    async fn data_conditions_read_shared_context() {
        let ctx = context_with(json!({"tier": "premium", "empty": null}));

        assert!(StepCondition::Always.evaluate(&ctx).await);
        assert!(StepCondition::Present { key: "tier".into() }.evaluate(&ctx).await);
        assert!(!StepCondition::Present { key: "empty".into() }.evaluate(&ctx).await);
        assert!(
            StepCondition::Equals { key: "tier".into(), value: json!("premium") }
                .evaluate(&ctx)
                .await
        );
        assert!(
            !StepCondition::StepSucceeded { task_id: "enricher".into() }
                .evaluate(&ctx)
                .await
        );
        let custom = StepCondition::custom(|ctx: &WorkflowContext| ctx.event == "listing.created");
        assert!(custom.evaluate(&ctx).await);
    }

    #[tokio::test]
    async fn input_mappings_build_from_context() {
        let mut ctx = context_with(json!({"a": 1, "b": 2}));
        ctx.step_results.insert(
            "enricher".into(),
            ExecutionResult::success(json!({"lat": 1.0})),
        );

        let select = InputMapping::Select { keys: vec!["b".into(), "missing".into()] };
        assert_eq!(serde_json::Value::Object(select.build(&ctx).await.unwrap()), json!({"b": 2}));

        let merge = InputMapping::Merge {
            values: json!({"b": 3, "c": 4}).as_object().cloned().unwrap(),
        };
        assert_eq!(
            serde_json::Value::Object(merge.build(&ctx).await.unwrap()),
            json!({"a": 1, "b": 3, "c": 4})
        );

        let from_step = InputMapping::StepOutput { task_id: "enricher".into() };
        assert_eq!(
            serde_json::Value::Object(from_step.build(&ctx).await.unwrap()),
            json!({"lat": 1.0})
        );

        let missing = InputMapping::StepOutput { task_id: "other".into() };
        assert!(matches!(missing.build(&ctx).await, Err(TaskError::MissingInput(_))));
    }

    #[test]
    fn definitions_load_from_json() {
        let definition: WorkflowDefinition = serde_json::from_value(json!({
            "id": "onboarding",
            "name": "Onboarding",
            "trigger_event": "listing.created",
            "on_error": "continue",
            "steps": [
                {"task_id": "enricher"},
                {"task_id": "mailer", "required": false, "parallel": "notify",
                 "condition": {"type": "present", "key": "sellerEmail"}}
            ]
        }))
        .unwrap();

        assert_eq!(definition.on_error, ErrorPolicy::Continue);
        assert!(definition.steps[0].required);
        assert!(!definition.steps[1].required);
        assert_eq!(definition.steps[1].parallel.as_deref(), Some("notify"));
        assert!(matches!(definition.steps[1].condition, StepCondition::Present { .. }));
    }
}
