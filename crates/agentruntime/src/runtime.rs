use crate::registry::{CacheWindows, TaskRegistry};
use crate::{Executor, Orchestrator};
use agentcore::{EventBus, Store, TaskConfig, TaskDefinition, TextGenerator, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub task_cache_ttl_secs: u64,
    pub metrics_cache_ttl_secs: u64,
    pub event_buffer_size: usize,
    /// Base of every task config merge
    pub task_defaults: TaskConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            task_cache_ttl_secs: 300,
            metrics_cache_ttl_secs: 60,
            event_buffer_size: 1000,
            task_defaults: TaskConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: RuntimeConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics_cache_ttl_secs > self.task_cache_ttl_secs {
            return Err(ConfigError::Invalid(format!(
                "metrics_cache_ttl_secs ({}) must not exceed task_cache_ttl_secs ({})",
                self.metrics_cache_ttl_secs, self.task_cache_ttl_secs
            )));
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::Invalid("event_buffer_size must be positive".into()));
        }
        Ok(())
    }

    pub fn cache_windows(&self) -> CacheWindows {
        CacheWindows {
            tasks: Duration::from_secs(self.task_cache_ttl_secs),
            metrics: Duration::from_secs(self.metrics_cache_ttl_secs),
        }
    }
}

/// Collects task and workflow definitions before the runtime is shared
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    store: Arc<dyn Store>,
    generator: Arc<dyn TextGenerator>,
    registry: TaskRegistry,
    workflows: Vec<WorkflowDefinition>,
}

impl RuntimeBuilder {
    pub fn registry_mut(&mut self) -> &mut TaskRegistry {
        &mut self.registry
    }

    pub fn register_task(mut self, definition: TaskDefinition) -> Self {
        self.registry.register(definition);
        self
    }

    pub fn register_workflow(mut self, definition: WorkflowDefinition) -> Self {
        self.workflows.push(definition);
        self
    }

    pub fn build(self) -> AgentRuntime {
        let events = EventBus::new(self.config.event_buffer_size);
        let registry = Arc::new(self.registry);
        let executor = Arc::new(
            Executor::new(Arc::clone(&registry), self.generator, events.clone())
                .with_task_defaults(self.config.task_defaults.clone()),
        );

        let mut orchestrator = Orchestrator::new(
            Arc::clone(&executor) as Arc<dyn crate::TaskRunner>,
            Arc::clone(&self.store),
            events.clone(),
        );
        for workflow in self.workflows {
            orchestrator.register_workflow(workflow);
        }

        AgentRuntime {
            config: self.config,
            registry,
            executor,
            orchestrator: Arc::new(orchestrator),
            events,
            store: self.store,
        }
    }
}

/// Single startup construction point wiring registry, executor and orchestrator
pub struct AgentRuntime {
    config: RuntimeConfig,
    registry: Arc<TaskRegistry>,
    executor: Arc<Executor>,
    orchestrator: Arc<Orchestrator>,
    events: EventBus,
    store: Arc<dyn Store>,
}

impl AgentRuntime {
    pub fn builder(
        config: RuntimeConfig,
        store: Arc<dyn Store>,
        generator: Arc<dyn TextGenerator>,
    ) -> RuntimeBuilder {
        let registry = TaskRegistry::with_windows(Arc::clone(&store), config.cache_windows());
        RuntimeBuilder {
            config,
            store,
            generator,
            registry,
            workflows: Vec::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<agentcore::EngineEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }
}
