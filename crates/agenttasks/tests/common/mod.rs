#![allow(dead_code)]

use agentcore::{Generation, GenerationError, GenerationRequest, TaskError, TextGenerator};
use agentruntime::{AgentRuntime, MemoryStore, RuntimeConfig};
use agenttasks::{builtin_tasks, builtin_workflows, Notification, Notifier};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Generator answering from a closure over the request
pub struct FnGenerator {
    reply: Box<dyn Fn(&GenerationRequest) -> Result<Generation, GenerationError> + Send + Sync>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl FnGenerator {
    pub fn new(
        reply: impl Fn(&GenerationRequest) -> Result<Generation, GenerationError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Description prompts get JSON, everything else an email
    pub fn listing_copy() -> Arc<Self> {
        Self::new(|request| {
            let content = if request.prompt.contains("prospective buyers") {
                r#"{"headline": "Bright townhouse near the park", "description": "Three bedrooms."}"#
            } else {
                "Subject: Your listing is live\n\nHi Dana,\nYour photo shoot is booked."
            };
            Ok(Generation {
                content: content.to_string(),
                tokens_used: 25,
            })
        })
    }

    pub fn failing(error: GenerationError) -> Arc<Self> {
        Self::new(move |_| Err(error.clone()))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for FnGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        let reply = (self.reply)(&request);
        self.requests.lock().unwrap().push(request);
        reply
    }
}

/// Forwards delivered notifications to a channel, or fails every send
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
    fail: bool,
}

impl ChannelNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender, fail: false }), receiver)
    }

    pub fn failing() -> Arc<Self> {
        let (sender, _) = mpsc::unbounded_channel();
        Arc::new(Self { sender, fail: true })
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, notification: Notification) -> Result<(), TaskError> {
        if self.fail {
            return Err(TaskError::Failed("mail relay refused connection".to_string()));
        }
        let _ = self.sender.send(notification);
        Ok(())
    }
}

/// Runtime with every built-in task persisted and registered
pub async fn runtime(
    store: Arc<MemoryStore>,
    generator: Arc<dyn TextGenerator>,
    notifier: Arc<dyn Notifier>,
) -> AgentRuntime {
    for task in builtin_tasks() {
        store.put_task(task).await;
    }
    let mut builder = AgentRuntime::builder(RuntimeConfig::default(), store, Arc::clone(&generator));
    agenttasks::register_all(builder.registry_mut(), generator, notifier);
    for workflow in builtin_workflows() {
        builder = builder.register_workflow(workflow);
    }
    builder.build()
}

pub async fn seed_listing(store: &MemoryStore, id: &str, listing: serde_json::Value) {
    store.put_document(agenttasks::LISTINGS, id, listing).await;
}
