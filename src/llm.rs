//! Language model client.
//!
//! [`LlmClient`] is the seam between the agent loop and the model: given
//! an ordered transcript it returns one completion turn. The production
//! implementation talks to any OpenAI-compatible chat-completions
//! endpoint (OpenAI, Groq, local gateways) with deterministic generation
//! parameters. Failures are returned as errors and are never retried
//! here; the agent loop converts them into a user-visible error string.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::{ChatMessage, Role};

/// Marker prefixed to tool results in the transcript. Also used as the
/// stop sequence so the model does not hallucinate its own observations.
pub const OBSERVATION_MARKER: &str = "Observation:";

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produce one completion for the transcript.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Client for OpenAI-compatible chat-completions APIs.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsClient {
    /// Build a client from config. The API key is read from the
    /// environment variable named in `llm.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let payload: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();

        let body = serde_json::json!({
            "model": self.model,
            "messages": payload,
            "temperature": 0.0,
            "stop": [OBSERVATION_MARKER],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("model API {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("model response missing choices[0].message.content"))?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted model for agent tests: returns canned turns in order.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct ScriptedClient {
        turns: Vec<String>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        pub fn new(turns: Vec<&str>) -> Self {
            Self {
                turns: turns.into_iter().map(String::from).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        /// Number of completions served so far.
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // Past the end of the script, repeat the final turn.
            let turn = self
                .turns
                .get(n)
                .or_else(|| self.turns.last())
                .ok_or_else(|| anyhow::anyhow!("scripted client has no turns"))?;
            Ok(turn.clone())
        }
    }

    /// A client that always fails, for exercising the error path.
    pub struct FailingClient;

    #[async_trait]
    impl LlmClient for FailingClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            bail!("model API 503: upstream unavailable")
        }
    }
}
