use super::{classify_http_error, classify_status, Responder};
use crate::errors::ResponderError;
use crate::model::Turn;
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAIResponder {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub client: reqwest::Client,
}

impl OpenAIResponder {
    pub fn new(model: String, api_key: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            api_key,
            temperature,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }

    fn messages(prompt: &str, history: &[Turn]) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 1);
        for turn in history {
            messages.push(json!({ "role": "user", "content": turn.user }));
            messages.push(json!({ "role": "assistant", "content": turn.response }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));
        messages
    }
}

#[async_trait]
impl Responder for OpenAIResponder {
    async fn reply(&self, prompt: &str, history: &[Turn]) -> Result<String, ResponderError> {
        let url = "https://api.openai.com/v1/chat/completions";

        let body = json!({
            "model": self.model,
            "messages": Self::messages(prompt, history),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_http_error("openai", e))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(classify_status("openai", status, &error_text));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ResponderError::Backend(format!("openai: malformed response: {}", e)))?;

        // a missing or null content (e.g. filtered output) is an empty reply
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_becomes_alternating_messages() {
        let history = vec![Turn {
            user: "hi".into(),
            response: "hello".into(),
        }];
        let msgs = OpenAIResponder::messages("and now?", &history);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[1]["role"], "assistant");
        assert_eq!(msgs[2]["content"], "and now?");
    }
}
