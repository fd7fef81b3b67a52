use super::Responder;
use crate::errors::ResponderError;
use crate::model::Turn;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Answers every prompt with the same text. Used for dry runs.
#[derive(Clone)]
pub struct CannedResponder {
    reply: String,
}

impl CannedResponder {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl Responder for CannedResponder {
    async fn reply(&self, _prompt: &str, _history: &[Turn]) -> Result<String, ResponderError> {
        Ok(self.reply.clone())
    }

    fn provider_name(&self) -> &'static str {
        "canned"
    }

    fn model(&self) -> &str {
        "canned"
    }
}

type ReplyFn = dyn Fn(&str) -> Result<String, ResponderError> + Send + Sync;

/// Test double with scripted outcomes.
///
/// Outcomes queued for a prompt substring are consumed first; once a queue is
/// drained the fallback function answers. Every call is counted.
pub struct ScriptedResponder {
    scripts: Mutex<Vec<(String, VecDeque<Result<String, ResponderError>>)>>,
    fallback: Box<ReplyFn>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    calls_by_prompt: Mutex<HashMap<String, usize>>,
}

impl ScriptedResponder {
    pub fn new<F>(fallback: F) -> Self
    where
        F: Fn(&str) -> Result<String, ResponderError> + Send + Sync + 'static,
    {
        Self {
            scripts: Mutex::new(Vec::new()),
            fallback: Box::new(fallback),
            delay: None,
            calls: AtomicUsize::new(0),
            calls_by_prompt: Mutex::new(HashMap::new()),
        }
    }

    pub fn echo() -> Self {
        Self::new(|p| Ok(format!("re: {}", p)))
    }

    /// Queues outcomes for prompts containing `needle`.
    pub fn script(
        self,
        needle: impl Into<String>,
        outcomes: impl IntoIterator<Item = Result<String, ResponderError>>,
    ) -> Self {
        if let Ok(mut s) = self.scripts.lock() {
            s.push((needle.into(), outcomes.into_iter().collect()));
        }
        self
    }

    /// Sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, needle: &str) -> usize {
        self.calls_by_prompt
            .lock()
            .map(|m| {
                m.iter()
                    .filter(|(p, _)| p.contains(needle))
                    .map(|(_, n)| *n)
                    .sum()
            })
            .unwrap_or(0)
    }

    fn next_scripted(&self, prompt: &str) -> Option<Result<String, ResponderError>> {
        let mut scripts = self.scripts.lock().ok()?;
        scripts
            .iter_mut()
            .find(|(needle, q)| prompt.contains(needle.as_str()) && !q.is_empty())
            .and_then(|(_, q)| q.pop_front())
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn reply(&self, prompt: &str, _history: &[Turn]) -> Result<String, ResponderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.calls_by_prompt.lock() {
            *m.entry(prompt.to_string()).or_insert(0) += 1;
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match self.next_scripted(prompt) {
            Some(outcome) => outcome,
            None => (self.fallback)(prompt),
        }
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_drains_then_falls_back() {
        let r = ScriptedResponder::echo().script(
            "flaky",
            [
                Err(ResponderError::Unavailable("down".into())),
                Ok("recovered".into()),
            ],
        );
        assert!(r.reply("a flaky prompt", &[]).await.is_err());
        assert_eq!(r.reply("a flaky prompt", &[]).await.unwrap(), "recovered");
        assert_eq!(r.reply("a flaky prompt", &[]).await.unwrap(), "re: a flaky prompt");
        assert_eq!(r.reply("other", &[]).await.unwrap(), "re: other");
        assert_eq!(r.calls(), 4);
        assert_eq!(r.calls_for("flaky"), 3);
    }
}
