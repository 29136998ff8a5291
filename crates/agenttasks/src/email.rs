use crate::notify::{Notification, Notifier};
use agentcore::{
    ExecutionContext, ExecutionResult, GenerationRequest, TaskError, TaskHandler, TextGenerator,
};
use agentruntime::prompt;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_INSTRUCTION: &str = "Write a short, friendly status update email to the seller \
of this listing. Start with a line of the form 'Subject: ...', then a blank line, then the body. \
Mention any scheduled photo shoot and anything the seller still needs to provide.";

const FALLBACK_SUBJECT: &str = "An update on your listing";

/// Generates a seller update email and hands it to the [`Notifier`]
pub struct SellerUpdateEmail {
    generator: Arc<dyn TextGenerator>,
    notifier: Arc<dyn Notifier>,
}

impl SellerUpdateEmail {
    pub fn new(generator: Arc<dyn TextGenerator>, notifier: Arc<dyn Notifier>) -> Self {
        Self { generator, notifier }
    }
}

/// Split a leading `Subject:` line from the body
fn split_subject(content: &str) -> (String, String) {
    let trimmed = content.trim();
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    match first.trim().strip_prefix("Subject:") {
        Some(subject) if !subject.trim().is_empty() => {
            (subject.trim().to_string(), rest.trim().to_string())
        }
        _ => (FALLBACK_SUBJECT.to_string(), trimmed.to_string()),
    }
}

#[async_trait]
impl TaskHandler for SellerUpdateEmail {
    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult, TaskError> {
        let to = ctx.require_str("sellerEmail")?.to_string();
        let instruction = ctx.instruction.as_deref().unwrap_or(DEFAULT_INSTRUCTION);

        let generation = self
            .generator
            .generate(GenerationRequest {
                prompt: prompt::build_prompt(instruction, &ctx.input),
                max_tokens: ctx.config.max_tokens,
                temperature: ctx.config.temperature,
                model: ctx.config.model.clone(),
                timeout: Duration::from_secs(ctx.config.timeout_secs),
            })
            .await?;

        let (subject, body) = split_subject(&generation.content);
        let notification = Notification::email(&to, &subject, &body);
        let notification_id = notification.id;

        // Delivery is not awaited; failures only reach the log
        let notifier = Arc::clone(&self.notifier);
        let execution_id = ctx.execution_id;
        tokio::spawn(async move {
            if let Err(e) = notifier.send(notification).await {
                tracing::warn!(%execution_id, %notification_id, "Seller email delivery failed: {}", e);
            }
        });

        ctx.events.info(format!("Queued seller update to {}", to));
        Ok(ExecutionResult::success(json!({
            "to": to,
            "subject": subject,
            "body": body,
            "notificationId": notification_id,
        }))
        .with_tokens(generation.tokens_used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_line_is_split_from_body() {
        let (subject, body) = split_subject("Subject: Photos booked\n\nHi Dana,\nAll set.");
        assert_eq!(subject, "Photos booked");
        assert_eq!(body, "Hi Dana,\nAll set.");
    }

    #[test]
    fn missing_subject_falls_back() {
        let (subject, body) = split_subject("Hi Dana, all set.");
        assert_eq!(subject, FALLBACK_SUBJECT);
        assert_eq!(body, "Hi Dana, all set.");
    }
}
