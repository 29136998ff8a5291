//! Built-in task library
//!
//! Hand-written handlers for listing onboarding, the generative-only listing
//! description task, the onboarding workflow, and the text-generation and
//! notification collaborators they use.

mod content;
mod email;
mod enrich;
mod generator;
mod notify;
mod schedule;
mod workflows;

pub use content::listing_description;
pub use email::SellerUpdateEmail;
pub use enrich::{ListingEnricher, LISTINGS};
pub use generator::{DisabledGenerator, HttpTextGenerator};
pub use notify::{Channel, LogNotifier, Notification, Notifier};
pub use schedule::{ShootScheduler, BOOKINGS};
pub use workflows::{builtin_workflows, listing_onboarding, LISTING_CREATED, LISTING_ONBOARDING};

use agentcore::{
    ExecutionMode, PersistedTask, TaskCategory, TaskConfigPatch, TaskDefinition, TextGenerator,
};
use agentruntime::TaskRegistry;
use std::sync::Arc;

pub const LISTING_ENRICHER: &str = "listing-enricher";
pub const SHOOT_SCHEDULER: &str = "shoot-scheduler";
pub const SELLER_UPDATE_EMAIL: &str = "seller-update-email";
pub const LISTING_DESCRIPTION: &str = "listing-description";

/// Register all built-in tasks with a registry
pub fn register_all(
    registry: &mut TaskRegistry,
    generator: Arc<dyn TextGenerator>,
    notifier: Arc<dyn Notifier>,
) {
    registry.register(
        TaskDefinition::new(LISTING_ENRICHER, "Listing enricher", TaskCategory::Enrichment)
            .with_mode(ExecutionMode::Sync)
            .with_handler(Arc::new(ListingEnricher)),
    );
    registry.register(
        TaskDefinition::new(SHOOT_SCHEDULER, "Photo shoot scheduler", TaskCategory::Scheduling)
            .with_handler(Arc::new(ShootScheduler)),
    );
    registry.register(
        TaskDefinition::new(
            SELLER_UPDATE_EMAIL,
            "Seller update email",
            TaskCategory::Communication,
        )
        .with_instruction(email::DEFAULT_INSTRUCTION)
        .with_config(TaskConfigPatch {
            max_tokens: Some(400),
            ..Default::default()
        })
        .with_handler(Arc::new(SellerUpdateEmail::new(generator, notifier))),
    );
    registry.register(listing_description());
}

/// Persisted task records matching [`register_all`], all active
pub fn builtin_tasks() -> Vec<PersistedTask> {
    let describe = |mut task: PersistedTask, description: &str| {
        task.description = Some(description.to_string());
        task
    };
    vec![
        describe(
            PersistedTask::new(LISTING_ENRICHER, "Listing enricher", TaskCategory::Enrichment),
            "Derives listing facts and flags missing fields",
        ),
        describe(
            PersistedTask::new(SHOOT_SCHEDULER, "Photo shoot scheduler", TaskCategory::Scheduling),
            "Suggests free photo-shoot slots",
        ),
        describe(
            PersistedTask::new(
                SELLER_UPDATE_EMAIL,
                "Seller update email",
                TaskCategory::Communication,
            ),
            "Emails the seller a status update",
        ),
        describe(
            PersistedTask::new(LISTING_DESCRIPTION, "Listing description", TaskCategory::Content)
                .with_instruction(content::DESCRIPTION_INSTRUCTION),
            "Writes the buyer-facing listing description",
        ),
    ]
}
