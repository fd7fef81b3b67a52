use super::{classify_http_error, classify_status, Responder};
use crate::errors::ResponderError;
use crate::model::Turn;
use async_trait::async_trait;
use serde_json::json;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicResponder {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub client: reqwest::Client,
}

impl AnthropicResponder {
    pub fn new(model: String, api_key: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            api_key,
            temperature,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }
}

/// Concatenates the text blocks of a messages-API reply.
fn collect_text(json: &serde_json::Value) -> String {
    json.get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl Responder for AnthropicResponder {
    async fn reply(&self, prompt: &str, history: &[Turn]) -> Result<String, ResponderError> {
        let url = "https://api.anthropic.com/v1/messages";

        let mut messages = Vec::new();
        for turn in history {
            messages.push(json!({ "role": "user", "content": turn.user }));
            messages.push(json!({ "role": "assistant", "content": turn.response }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": messages,
        });

        let resp = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_http_error("anthropic", e))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(classify_status("anthropic", status, &error_text));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            ResponderError::Backend(format!("anthropic: malformed response: {}", e))
        })?;

        Ok(collect_text(&json))
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
