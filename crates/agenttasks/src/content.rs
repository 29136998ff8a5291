use agentcore::{TaskCategory, TaskConfigPatch, TaskDefinition};

pub const DESCRIPTION_INSTRUCTION: &str = "Write a listing description for prospective buyers \
from the facts below. Two short paragraphs, no superlatives you cannot back with a fact. \
Reply as JSON with the keys \"headline\" and \"description\".";

/// Listing description has no handler; it runs on the generative fallback
pub fn listing_description() -> TaskDefinition {
    TaskDefinition::new(
        crate::LISTING_DESCRIPTION,
        "Listing description",
        TaskCategory::Content,
    )
    .with_instruction(DESCRIPTION_INSTRUCTION)
    .with_config(TaskConfigPatch {
        max_tokens: Some(600),
        temperature: Some(0.8),
        ..Default::default()
    })
}
