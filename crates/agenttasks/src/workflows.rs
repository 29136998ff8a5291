use crate::{LISTING_DESCRIPTION, LISTING_ENRICHER, SELLER_UPDATE_EMAIL, SHOOT_SCHEDULER};
use agentcore::{ErrorPolicy, StepCondition, WorkflowDefinition, WorkflowStep};

pub const LISTING_CREATED: &str = "listing.created";
pub const LISTING_ONBOARDING: &str = "listing-onboarding";

/// Enrich, then schedule and describe in parallel, then tell the seller
pub fn listing_onboarding() -> WorkflowDefinition {
    WorkflowDefinition::new(LISTING_ONBOARDING, "Listing onboarding", LISTING_CREATED)
        .with_description("Prepares a newly created listing and keeps the seller informed")
        .step(WorkflowStep::new(LISTING_ENRICHER))
        .step(WorkflowStep::new(SHOOT_SCHEDULER).in_group("prepare"))
        .step(
            WorkflowStep::new(LISTING_DESCRIPTION)
                .in_group("prepare")
                .optional(),
        )
        .step(
            WorkflowStep::new(SELLER_UPDATE_EMAIL)
                .when(StepCondition::Present {
                    key: "sellerEmail".to_string(),
                })
                .optional(),
        )
        .on_error(ErrorPolicy::Stop)
}

pub fn builtin_workflows() -> Vec<WorkflowDefinition> {
    vec![listing_onboarding()]
}
