//! Local OpenAI-compatible backend (LM Studio, llama.cpp server, Ollama)

use super::{backend_error, ChatBackend};
use crate::error::OrchestrationError;
use crate::models::ChatMessage;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(url = %url, error = %e, "Local backend probe failed");
                false
            }
        }
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Local LLM request failed: {}", e);
                OrchestrationError::LlmError(format!("Local LLM error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(backend_error("local", status, &error_text));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            OrchestrationError::LlmError(format!("Local LLM parse error: {}", e))
        })?;

        first_choice_text(completion)
    }
}

fn first_choice_text(completion: CompletionResponse) -> Result<String> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| OrchestrationError::LlmError("Empty response from local LLM".to_string()))
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
