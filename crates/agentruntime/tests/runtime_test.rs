mod common;

use agentcore::{
    EngineEvent, ExecuteTaskRequest, ExecutionContext, ExecutionResult, ExecutionStatus,
    PersistedTask, TaskCategory, TaskDefinition, TaskFilter, TriggerSource, WorkflowDefinition,
    WorkflowStatus, WorkflowStep, WorkflowTrigger,
};
use agentruntime::{AgentRuntime, MemoryStore, RuntimeConfig};
use common::{payload, CountingHandler, ScriptedGenerator};
use serde_json::json;
use std::sync::Arc;

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put_task(PersistedTask::new("enricher", "Enricher", TaskCategory::Enrichment))
        .await;
    store
        .put_task(
            PersistedTask::new("describer", "Describer", TaskCategory::Content)
                .with_instruction("Describe this listing for buyers."),
        )
        .await;
    store
}

fn onboarding() -> WorkflowDefinition {
    WorkflowDefinition::new("onboarding", "Listing onboarding", "listing.created")
        .step(WorkflowStep::new("enricher"))
        .step(WorkflowStep::new("describer"))
}

#[tokio::test]
async fn handler_and_fallback_tasks_run_through_a_workflow() {
    common::init_tracing();
    let store = seeded_store().await;
    let generator = ScriptedGenerator::replying(r#"{"headline": "Sunny bungalow"}"#, 42);
    let enricher = CountingHandler::new(|ctx: &ExecutionContext| {
        ctx.events.info("enriching");
        Ok(ExecutionResult::success(json!({ "sqft": 1200 })))
    });

    let runtime = AgentRuntime::builder(RuntimeConfig::default(), store.clone(), generator.clone())
        .register_task(
            TaskDefinition::new("enricher", "Enricher", TaskCategory::Enrichment)
                .with_handler(enricher.clone()),
        )
        .register_task(TaskDefinition::new("describer", "Describer", TaskCategory::Content))
        .register_workflow(onboarding())
        .build();
    let mut events = runtime.subscribe_events();

    let trigger = WorkflowTrigger::new("listing.created")
        .with_correlation("listingId", "L7")
        .with_data(payload(json!({ "address": "7 Elm St" })));
    let result = runtime
        .orchestrator()
        .execute_workflow("onboarding", trigger)
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.completed_steps, 2);
    assert_eq!(enricher.calls(), 1);
    assert_eq!(
        result.step_results["describer"].output,
        Some(json!({ "headline": "Sunny bungalow" }))
    );
    assert_eq!(result.step_results["describer"].tokens_used, Some(42));

    // The describer prompt carries the enricher output rendered as JSON
    let prompt = generator.last_request().unwrap().prompt;
    assert!(prompt.starts_with("Describe this listing for buyers."));
    assert!(prompt.contains("7 Elm St"));
    assert!(prompt.contains("1200"));

    let executions = store.executions_for("describer").await;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert_eq!(executions[0].trigger_source, TriggerSource::Workflow);
    assert_eq!(executions[0].triggered_by.as_deref(), Some("workflow:onboarding"));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(match event {
            EngineEvent::TaskStarted { .. } => "task_started",
            EngineEvent::TaskNote { .. } => "task_note",
            EngineEvent::TaskFinished { .. } => "task_finished",
            EngineEvent::WorkflowStarted { .. } => "workflow_started",
            EngineEvent::StepSettled { .. } => "step_settled",
            EngineEvent::WorkflowFinished { .. } => "workflow_finished",
        });
    }
    assert_eq!(
        seen,
        vec![
            "workflow_started",
            "task_started",
            "task_note",
            "task_finished",
            "step_settled",
            "task_started",
            "task_finished",
            "step_settled",
            "workflow_finished",
        ]
    );

    let history = runtime
        .orchestrator()
        .get_workflows_for_resource("listingId", "L7")
        .await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].steps.len(), 2);
}

#[tokio::test]
async fn deactivating_a_task_takes_effect_after_the_cache_window() {
    let store = seeded_store().await;
    let config = RuntimeConfig {
        task_cache_ttl_secs: 0,
        metrics_cache_ttl_secs: 0,
        ..Default::default()
    };
    let runtime = AgentRuntime::builder(config, store.clone(), ScriptedGenerator::replying("ok", 1))
        .register_task(
            TaskDefinition::new("enricher", "Enricher", TaskCategory::Enrichment)
                .with_handler(CountingHandler::succeeding(json!({}))),
        )
        .build();

    let request = ExecuteTaskRequest::new("enricher", TriggerSource::Api);
    assert!(runtime.executor().execute_task(request.clone()).await.success);

    runtime.registry().update_status("enricher", false).await.unwrap();
    let result = runtime.executor().execute_task(request).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("not active"));

    let active = runtime
        .registry()
        .fetch_all_persisted(&TaskFilter {
            active: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "describer");

    let metrics = runtime.registry().fetch_metrics(Some("enricher")).await.unwrap();
    assert_eq!(metrics[0].total_executions, 2);
    assert_eq!(metrics[0].successful, 1);
}

#[test]
fn config_file_round_trips_through_disk() {
    let path = std::env::temp_dir().join(format!("agent-config-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"{"task_cache_ttl_secs": 600, "event_buffer_size": 64, "task_defaults": {"temperature": 0.2}}"#,
    )
    .unwrap();

    let config = RuntimeConfig::from_file(&path).unwrap();
    assert_eq!(config.task_cache_ttl_secs, 600);
    assert_eq!(config.metrics_cache_ttl_secs, 60);
    assert_eq!(config.event_buffer_size, 64);
    assert_eq!(config.task_defaults.temperature, 0.2);
    assert_eq!(config.task_defaults.max_tokens, 1024);

    std::fs::remove_file(&path).unwrap();
    assert!(RuntimeConfig::from_file(&path).is_err());
}
