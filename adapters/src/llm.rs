//! LLM completion client and synthesis prompt templates
//!
//! The engine treats the model as text-in/text-out. The HTTP client speaks
//! the OpenAI-compatible chat completions shape, which also covers local
//! servers such as Ollama and vLLM.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{debug, warn};

use mimir_core::config::LlmConfig;
use mimir_core::types::SynthesisStrategy;

use crate::error::AdapterError;

/// Sampling parameters for one completion call
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

/// Opaque text completion service
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, AdapterError>;
}

/// Render the synthesis prompt for a strategy.
///
/// Creative synthesis runs hotter than the evidence-bound strategies, so
/// each template carries its own sampling parameters.
pub fn synthesis_prompt(
    strategy: SynthesisStrategy,
    query: &str,
    evidence: &[&str],
) -> (String, CompletionParams) {
    let sources = evidence
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[{}] {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n");
    let (instruction, params) = match strategy {
        SynthesisStrategy::Simple => (
            "Answer the question directly using only the sources below.",
            CompletionParams {
                temperature: 0.2,
                top_p: 0.9,
                max_tokens: 256,
            },
        ),
        SynthesisStrategy::Reasoning => (
            "Answer step by step, citing which source supports each step.",
            CompletionParams {
                temperature: 0.4,
                top_p: 0.9,
                max_tokens: 512,
            },
        ),
        SynthesisStrategy::Comparative => (
            "Contrast the perspectives in the sources and summarize the trade-offs.",
            CompletionParams {
                temperature: 0.5,
                top_p: 0.9,
                max_tokens: 512,
            },
        ),
        SynthesisStrategy::Creative => (
            "Surface non-obvious connections between the sources relevant to the question.",
            CompletionParams {
                temperature: 0.9,
                top_p: 0.95,
                max_tokens: 512,
            },
        ),
    };
    let prompt = format!("{instruction}\n\nQuestion: {query}\n\nSources:\n{sources}");
    (prompt, params)
}

/// Chat-completions client with bounded retries
pub struct HttpLlmClient {
    client: Client,
    config: LlmConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn extract_content(response: &JsonValue) -> Result<String, AdapterError> {
        response["choices"]
            .get(0)
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                AdapterError::InvalidResponse("missing choices[0].message.content".to_string())
            })
    }

    async fn send_once(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, AdapterError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_tokens,
        });
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AdapterError::Unavailable(format!(
                "completion endpoint returned {}",
                response.status()
            )));
        }
        let payload: JsonValue = response.json().await?;
        Self::extract_content(&payload)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, AdapterError> {
        let mut last_error = AdapterError::Unavailable("no attempts made".to_string());
        for attempt in 0..=self.config.retry_attempts {
            match self.send_once(prompt, params).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "completion succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "completion attempt failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
