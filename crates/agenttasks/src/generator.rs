use agentcore::{Generation, GenerationError, GenerationRequest, TextGenerator};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

/// Text generator speaking an OpenAI-compatible chat-completions endpoint
pub struct HttpTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    default_model: String,
}

impl HttpTextGenerator {
    pub fn new(endpoint: impl AsRef<str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: resolve_endpoint(endpoint.as_ref()),
            api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn resolve_endpoint(endpoint: &str) -> String {
    if endpoint.contains("/chat/completions") {
        endpoint.to_string()
    } else {
        format!("{}/chat/completions", endpoint.trim_end_matches('/'))
    }
}

fn extract_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn parse_completion(body: ChatResponse) -> Result<Generation, GenerationError> {
    let content = body
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .map(extract_text)
        .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".to_string()))?;

    Ok(Generation {
        content: content.trim().to_string(),
        tokens_used: body.usage.and_then(|u| u.total_tokens).unwrap_or(0),
    })
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let payload = json!({
            "model": model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        tracing::debug!(endpoint = %self.endpoint, model, "Requesting completion");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .timeout(request.timeout)
            .json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout {
                    seconds: request.timeout.as_secs(),
                }
            } else {
                GenerationError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, message });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        parse_completion(body)
    }
}

/// Fails every call; used when no endpoint is configured
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _request: GenerationRequest) -> Result<Generation, GenerationError> {
        Err(GenerationError::Unavailable)
    }
}
