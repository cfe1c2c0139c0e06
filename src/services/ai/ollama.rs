use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{LlmProvider, Message};

/// Local Ollama server. Responses are requested in JSON mode since every caller
/// expects a JSON object back.
pub struct OllamaProvider {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let mut ollama_messages = vec![json!({
            "role": "system",
            "content": system_prompt,
        })];
        ollama_messages.extend(
            messages
                .iter()
                .map(|msg| json!({ "role": msg.role, "content": msg.content })),
        );

        let body = json!({
            "model": self.model,
            "messages": ollama_messages,
            "stream": false,
            "format": "json",
            "options": { "temperature": 0 },
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .context("failed to call Ollama API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Ollama response")?;

        if !status.is_success() {
            anyhow::bail!("Ollama API error ({}): {}", status, data);
        }

        tracing::debug!(
            model = %self.model,
            eval_count = data["eval_count"].as_u64().unwrap_or_default(),
            "ollama chat completed"
        );

        data["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing content in Ollama response"))
    }
}
