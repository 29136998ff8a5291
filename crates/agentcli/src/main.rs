use agentcore::{
    EngineEvent, NoteLevel, Payload, TextGenerator, WorkflowDefinition, WorkflowStatus,
    WorkflowTrigger,
};
use agentruntime::{partition_steps, AgentRuntime, MemoryStore, RuntimeConfig};
use agenttasks::{builtin_tasks, builtin_workflows, DisabledGenerator, HttpTextGenerator, LogNotifier};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Agent task and workflow engine CLI", long_about = None)]
struct Cli {
    /// Runtime config JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LlmArgs {
    /// Chat-completions endpoint; text generation is disabled without one
    #[arg(long, env = "AGENT_LLM_ENDPOINT", global = true)]
    llm_endpoint: Option<String>,

    #[arg(long, env = "AGENT_LLM_MODEL", global = true)]
    llm_model: Option<String>,

    #[arg(long, env = "AGENT_LLM_API_KEY", global = true, hide_env_values = true)]
    llm_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a workflow and print its progress
    Run {
        /// Workflow JSON file; the built-in onboarding workflow when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Trigger event; defaults to the workflow's own trigger
        #[arg(short, long)]
        event: Option<String>,

        /// Trigger data as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Correlation id as key=value, repeatable
        #[arg(short, long = "correlate", value_parser = parse_key_value)]
        correlate: Vec<(String, String)>,

        /// Seed documents: {"collection": {"id": {...}}}
        #[arg(short, long)]
        documents: Option<PathBuf>,
    },

    /// Check a workflow file against the registered tasks
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List registered tasks
    Tasks,

    /// Write the built-in onboarding workflow as an example file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    let generator = build_generator(&cli.llm);

    match cli.command {
        Commands::Run {
            file,
            event,
            input,
            correlate,
            documents,
        } => {
            run_workflow(config, generator, file, event, input, correlate, documents).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(config, generator, file).await?;
        }

        Commands::Tasks => {
            list_tasks(config, generator).await;
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

fn build_generator(args: &LlmArgs) -> Arc<dyn TextGenerator> {
    match &args.llm_endpoint {
        Some(endpoint) => {
            let mut generator = HttpTextGenerator::new(endpoint);
            if let Some(model) = &args.llm_model {
                generator = generator.with_model(model);
            }
            if let Some(key) = &args.llm_api_key {
                generator = generator.with_api_key(key);
            }
            tracing::info!(endpoint = generator.endpoint(), "Text generation enabled");
            Arc::new(generator)
        }
        None => {
            tracing::debug!("No LLM endpoint configured; generative tasks will fail");
            Arc::new(DisabledGenerator)
        }
    }
}

/// In-memory runtime with the built-in tasks persisted and registered
async fn build_runtime(
    config: RuntimeConfig,
    generator: Arc<dyn TextGenerator>,
    store: Arc<MemoryStore>,
    workflows: Vec<WorkflowDefinition>,
) -> AgentRuntime {
    for task in builtin_tasks() {
        store.put_task(task).await;
    }
    let mut builder = AgentRuntime::builder(config, store, Arc::clone(&generator));
    agenttasks::register_all(builder.registry_mut(), generator, Arc::new(LogNotifier));
    for workflow in workflows {
        builder = builder.register_workflow(workflow);
    }
    builder.build()
}

fn load_workflow(file: &Path) -> Result<WorkflowDefinition> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading workflow {}", file.display()))?;
    let workflow: WorkflowDefinition = serde_json::from_str(&raw)
        .with_context(|| format!("parsing workflow {}", file.display()))?;
    Ok(workflow)
}

async fn seed_documents(store: &MemoryStore, file: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading documents {}", file.display()))?;
    let collections: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)?;

    let mut count = 0;
    for (collection, docs) in collections {
        let docs = docs
            .as_object()
            .ok_or_else(|| anyhow!("collection '{}' must map ids to documents", collection))?;
        for (id, doc) in docs {
            store.put_document(collection.clone(), id.clone(), doc.clone()).await;
            count += 1;
        }
    }
    Ok(count)
}

fn print_event(event: EngineEvent) {
    match event {
        EngineEvent::WorkflowStarted { workflow_id, event, .. } => {
            println!("▶️  Workflow {} started by {}", workflow_id, event);
        }
        EngineEvent::TaskStarted { task_id, .. } => {
            println!("  ⚡ Starting task: {}", task_id);
        }
        EngineEvent::TaskNote { task_id, level, message, .. } => match level {
            NoteLevel::Info => println!("     ℹ️  [{}] {}", task_id, message),
            NoteLevel::Warning => println!("     ⚠️  [{}] {}", task_id, message),
        },
        EngineEvent::TaskFinished {
            task_id,
            success,
            error_code,
            duration_ms,
            ..
        } => {
            if success {
                println!("  ✅ Task {} completed in {}ms", task_id, duration_ms);
            } else {
                let code = error_code.map(|c| c.to_string()).unwrap_or_default();
                println!("  ❌ Task {} failed ({}) after {}ms", task_id, code, duration_ms);
            }
        }
        EngineEvent::StepSettled { task_id, group, status, .. } => {
            println!("  ⏹  Step {} settled as {} (group {})", task_id, status, group);
        }
        EngineEvent::WorkflowFinished { status, duration_ms, .. } => match status {
            WorkflowStatus::Completed => {
                println!("✨ Workflow completed successfully in {}ms", duration_ms)
            }
            WorkflowStatus::Paused => println!("⏸  Workflow paused after {}ms", duration_ms),
            other => println!("💥 Workflow {} after {}ms", other, duration_ms),
        },
    }
}

async fn run_workflow(
    config: RuntimeConfig,
    generator: Arc<dyn TextGenerator>,
    file: Option<PathBuf>,
    event: Option<String>,
    input: Option<String>,
    correlate: Vec<(String, String)>,
    documents: Option<PathBuf>,
) -> Result<()> {
    let workflow = match &file {
        Some(path) => {
            println!("🚀 Loading workflow from: {}", path.display());
            load_workflow(path)?
        }
        None => agenttasks::listing_onboarding(),
    };

    println!("📋 Workflow: {} ({})", workflow.name, workflow.id);
    println!("   Trigger: {}", workflow.trigger_event);
    println!("   Steps: {}", workflow.steps.len());
    println!();

    let data: Payload = match input {
        Some(raw) => match serde_json::from_str::<serde_json::Value>(&raw)? {
            serde_json::Value::Object(map) => map,
            _ => bail!("Input must be a JSON object"),
        },
        None => Payload::new(),
    };

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &documents {
        let seeded = seed_documents(&store, path).await?;
        println!("📚 Seeded {} document(s)", seeded);
    }

    let workflow_id = workflow.id.clone();
    let mut trigger =
        WorkflowTrigger::new(event.unwrap_or_else(|| workflow.trigger_event.clone())).with_data(data);
    for (key, value) in correlate {
        trigger = trigger.with_correlation(key, value);
    }

    let runtime = build_runtime(config, generator, store, vec![workflow]).await;
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(event);
        }
    });

    let result = runtime
        .orchestrator()
        .execute_workflow(&workflow_id, trigger)
        .await?;

    // Let the printer drain before the summary
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", result.execution_id);
    println!("   Status: {}", result.status);
    println!("   Completed: {}/{} steps", result.completed_steps, result.total_steps);
    if let Some(error) = &result.error {
        println!("   Error: {}", error);
    }

    if !result.step_results.is_empty() {
        println!();
        println!("📤 Outputs:");
        for (task_id, step) in &result.step_results {
            match (&step.output, &step.error) {
                (Some(output), _) => {
                    println!("   {}:", task_id);
                    println!("     {}", serde_json::to_string_pretty(output)?.replace('\n', "\n     "));
                }
                (None, Some(error)) => println!("   {}: {}", task_id, error),
                (None, None) => println!("   {}: (no output)", task_id),
            }
        }
    }

    if result.status == WorkflowStatus::Failed {
        bail!("workflow {} failed", result.workflow_id);
    }
    Ok(())
}

async fn validate_workflow(
    config: RuntimeConfig,
    generator: Arc<dyn TextGenerator>,
    file: PathBuf,
) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(&file)?;
    if workflow.steps.is_empty() {
        bail!("Workflow '{}' has no steps", workflow.id);
    }

    let runtime = build_runtime(config, generator, Arc::new(MemoryStore::new()), vec![]).await;
    let registry = runtime.registry();

    let mut seen = HashSet::new();
    for step in &workflow.steps {
        if registry.lookup(&step.task_id).is_none() {
            println!("   ⚠️  Step '{}' has no in-code definition; it needs a persisted instruction", step.task_id);
        }
        if !seen.insert(step.task_id.as_str()) {
            println!("   ⚠️  Task '{}' appears twice; its later result replaces the earlier one", step.task_id);
        }
    }

    let groups = partition_steps(&workflow.steps);
    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Trigger: {}", workflow.trigger_event);
    println!("   Steps: {} in {} group(s)", workflow.steps.len(), groups.len());
    for (index, group) in groups.iter().enumerate() {
        let ids: Vec<&str> = group
            .iter()
            .map(|&i| workflow.steps[i].task_id.as_str())
            .collect();
        println!("     {}. {}", index + 1, ids.join(" + "));
    }

    Ok(())
}

async fn list_tasks(config: RuntimeConfig, generator: Arc<dyn TextGenerator>) {
    println!("📦 Registered Tasks:");
    println!();

    let runtime = build_runtime(config, generator, Arc::new(MemoryStore::new()), vec![]).await;
    for definition in runtime.registry().list_all() {
        let kind = if definition.has_handler() { "handler" } else { "generative" };
        println!("  • {} ({:?}, {:?}, {})", definition.id, definition.category, definition.mode, kind);
        println!("    {}", definition.name);
    }

    println!();
    println!("🔀 Built-in Workflows:");
    for workflow in builtin_workflows() {
        println!("  • {} on {}", workflow.id, workflow.trigger_event);
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let workflow = agenttasks::listing_onboarding();
    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  agent run --file {} --correlate listingId=L1 --input '{{\"sellerEmail\": \"seller@example.com\"}}' --documents docs.json",
        output.display()
    );

    Ok(())
}
