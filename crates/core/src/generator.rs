use crate::traits::AnswerGenerator;
use crate::{GenerationOptions, RagError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_GENERATION_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GENERATION_MODEL: &str = "llama-3.1-8b-instant";

/// Answer generator backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    fn request_body(&self, prompt: &str, options: &GenerationOptions) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": false,
        })
    }
}

#[async_trait]
impl AnswerGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, RagError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&self.request_body(prompt, options));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| RagError::Generation(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!("API error {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| RagError::Generation(format!("malformed response: {error}")))?;

        first_choice_text(parsed)
    }
}

fn first_choice_text(response: ChatResponse) -> Result<String, RagError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| RagError::Generation("response contained no completion".to_string()))
}
