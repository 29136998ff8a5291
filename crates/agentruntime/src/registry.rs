use crate::cache::TtlCache;
use agentcore::{
    PersistedTask, Store, StoreError, TaskConfigPatch, TaskDefinition, TaskFilter, TaskMetrics,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Expiry windows for the persisted-task caches
#[derive(Debug, Clone, Copy)]
pub struct CacheWindows {
    pub tasks: Duration,
    /// Shorter than `tasks`; metrics must look fresher
    pub metrics: Duration,
}

impl Default for CacheWindows {
    fn default() -> Self {
        Self {
            tasks: Duration::from_secs(300),
            metrics: Duration::from_secs(60),
        }
    }
}

/// Catalog of in-code task definitions plus cached access to persisted task
/// metadata.
///
/// Built once at startup and shared by reference with the executor; there is
/// no process-wide instance.
pub struct TaskRegistry {
    definitions: HashMap<String, Arc<TaskDefinition>>,
    store: Arc<dyn Store>,
    windows: CacheWindows,
    tasks: TtlCache<String, Option<PersistedTask>>,
    listings: TtlCache<TaskFilter, Vec<PersistedTask>>,
    metrics: TtlCache<Option<String>, Vec<TaskMetrics>>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_windows(store, CacheWindows::default())
    }

    pub fn with_windows(store: Arc<dyn Store>, windows: CacheWindows) -> Self {
        Self {
            definitions: HashMap::new(),
            store,
            windows,
            tasks: TtlCache::new(),
            listings: TtlCache::new(),
            metrics: TtlCache::new(),
        }
    }

    /// Register a definition; a later registration for the same id replaces it
    pub fn register(&mut self, definition: TaskDefinition) {
        tracing::info!(
            task_id = %definition.id,
            handler = definition.has_handler(),
            "Registering task"
        );
        self.definitions
            .insert(definition.id.clone(), Arc::new(definition));
    }

    pub fn lookup(&self, task_id: &str) -> Option<Arc<TaskDefinition>> {
        self.definitions.get(task_id).cloned()
    }

    /// All registered definitions, sorted by id
    pub fn list_all(&self) -> Vec<Arc<TaskDefinition>> {
        let mut all: Vec<_> = self.definitions.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn windows(&self) -> CacheWindows {
        self.windows
    }

    pub async fn fetch_persisted_task(
        &self,
        task_id: &str,
    ) -> Result<Option<PersistedTask>, StoreError> {
        let store = Arc::clone(&self.store);
        self.tasks
            .get_or_fetch(task_id.to_string(), self.windows.tasks, || async move {
                tracing::debug!(task_id, "Task cache miss");
                store.get_task(task_id).await
            })
            .await
    }

    pub async fn fetch_all_persisted(
        &self,
        filter: &TaskFilter,
    ) -> Result<Vec<PersistedTask>, StoreError> {
        let store = Arc::clone(&self.store);
        self.listings
            .get_or_fetch(filter.clone(), self.windows.tasks, || async move {
                store.list_tasks(filter).await
            })
            .await
    }

    pub async fn fetch_metrics(
        &self,
        task_id: Option<&str>,
    ) -> Result<Vec<TaskMetrics>, StoreError> {
        let store = Arc::clone(&self.store);
        self.metrics
            .get_or_fetch(task_id.map(str::to_string), self.windows.metrics, || async move {
                store.task_metrics(task_id).await
            })
            .await
    }

    /// Writes straight through; cached reads catch up on expiry
    pub async fn update_status(&self, task_id: &str, active: bool) -> Result<(), StoreError> {
        tracing::info!(task_id, active, "Updating task status");
        self.store.set_task_active(task_id, active).await
    }

    /// Writes straight through; cached reads catch up on expiry
    pub async fn update_config(
        &self,
        task_id: &str,
        patch: &TaskConfigPatch,
    ) -> Result<(), StoreError> {
        tracing::info!(task_id, "Updating task config");
        self.store.patch_task_config(task_id, patch).await
    }
}
