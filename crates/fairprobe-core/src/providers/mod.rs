use crate::config::BackendConfig;
use crate::errors::{AuditError, ResponderError};
use crate::model::Turn;
use async_trait::async_trait;
use std::sync::Arc;

pub mod anthropic;
pub mod fake;
pub mod openai;
pub mod replay;

/// The system under audit, reduced to one capability.
///
/// One call is one outbound request. An instance is not assumed safe for
/// concurrent use by several workers; the runner gives each worker its own.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, prompt: &str, history: &[Turn]) -> Result<String, ResponderError>;

    fn provider_name(&self) -> &'static str;

    fn model(&self) -> &str {
        ""
    }

    /// Hash of the fixed reply set, for backends that answer from one.
    fn fingerprint(&self) -> Option<&str> {
        None
    }
}

/// Builds one responder for `cfg`. Call once per worker.
pub fn build_responder(cfg: &BackendConfig) -> Result<Arc<dyn Responder>, AuditError> {
    let responder: Arc<dyn Responder> = match cfg.provider.as_str() {
        "openai" => {
            let key = required_env("OPENAI_API_KEY")?;
            Arc::new(openai::OpenAIResponder::new(
                cfg.model.clone(),
                key,
                cfg.temperature.unwrap_or(0.0),
                cfg.max_tokens.unwrap_or(512),
            ))
        }
        "anthropic" => {
            let key = required_env("ANTHROPIC_API_KEY")?;
            Arc::new(anthropic::AnthropicResponder::new(
                cfg.model.clone(),
                key,
                cfg.temperature.unwrap_or(0.0),
                cfg.max_tokens.unwrap_or(512),
            ))
        }
        "canned" => Arc::new(fake::CannedResponder::new(
            cfg.reply
                .clone()
                .unwrap_or_else(|| "Thank you for your message.".to_string()),
        )),
        "replay" => {
            let path = cfg.reply.as_deref().ok_or_else(|| {
                AuditError::Configuration(
                    "replay backend needs `reply` set to a JSONL recording path".into(),
                )
            })?;
            Arc::new(replay::ReplayResponder::from_path(path).map_err(|e| {
                AuditError::Configuration(format!("failed to load replay file: {:#}", e))
            })?)
        }
        other => {
            return Err(AuditError::Configuration(format!(
                "unknown backend provider: {}",
                other
            )))
        }
    };
    Ok(responder)
}

fn required_env(name: &str) -> Result<String, AuditError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AuditError::Configuration(format!("{} not set", name))),
    }
}

/// Maps a transport failure onto the responder taxonomy.
pub(crate) fn classify_http_error(provider: &str, e: reqwest::Error) -> ResponderError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ResponderError::Unavailable(format!("{} unreachable: {}", provider, e))
    } else {
        ResponderError::Backend(format!("{} request failed: {}", provider, e))
    }
}

pub(crate) fn classify_status(provider: &str, status: reqwest::StatusCode, body: &str) -> ResponderError {
    match status.as_u16() {
        401 | 403 => ResponderError::Configuration(format!(
            "{} rejected credentials ({}): {}",
            provider, status, body
        )),
        429 | 502 | 503 | 504 => {
            ResponderError::Unavailable(format!("{} unavailable ({}): {}", provider, status, body))
        }
        _ => ResponderError::Backend(format!("{} API error ({}): {}", provider, status, body)),
    }
}
