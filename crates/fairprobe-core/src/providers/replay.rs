use super::Responder;
use crate::errors::ResponderError;
use crate::model::Turn;
use async_trait::async_trait;
use serde::Deserialize;
use sha2::Digest;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct RecordedReply {
    prompt: String,
    #[serde(alias = "text")]
    response: String,
}

/// Replays replies recorded earlier, one JSON object per line:
/// `{"prompt": "...", "response": "..."}`.
///
/// Lets an audit be re-run offline against a fixed transcript.
#[derive(Clone)]
pub struct ReplayResponder {
    replies: Arc<HashMap<String, String>>,
    fingerprint: String,
}

impl ReplayResponder {
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "failed to open replay file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;
        let reader = std::io::BufReader::new(file);

        let mut replies = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let rec: RecordedReply = serde_json::from_str(&line)
                .map_err(|e| anyhow::anyhow!("line {}: parse error: {}", i + 1, e))?;
            if replies.insert(rec.prompt.clone(), rec.response).is_some() {
                anyhow::bail!("line {}: duplicate prompt in replay file", i + 1);
            }
        }
        Ok(Self::from_map(replies))
    }

    pub fn from_map(replies: HashMap<String, String>) -> Self {
        let mut keys: Vec<&String> = replies.keys().collect();
        keys.sort();
        let mut hasher = sha2::Sha256::new();
        for k in keys {
            hasher.update(k.as_bytes());
            hasher.update(b"\0");
            hasher.update(replies[k].as_bytes());
            hasher.update(b"\n");
        }
        let fingerprint = hex::encode(hasher.finalize());
        Self {
            replies: Arc::new(replies),
            fingerprint,
        }
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

#[async_trait]
impl Responder for ReplayResponder {
    async fn reply(&self, prompt: &str, _history: &[Turn]) -> Result<String, ResponderError> {
        self.replies.get(prompt).cloned().ok_or_else(|| {
            ResponderError::Backend(format!(
                "no recorded reply for prompt ({} chars)",
                prompt.len()
            ))
        })
    }

    fn provider_name(&self) -> &'static str {
        "replay"
    }

    fn model(&self) -> &str {
        "replay"
    }

    fn fingerprint(&self) -> Option<&str> {
        Some(&self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_replays_recorded_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"prompt": "hi", "response": "hello"}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, r#"{{"prompt": "bye", "text": "see you"}}"#).unwrap();

        let r = ReplayResponder::from_path(f.path()).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.reply("hi", &[]).await.unwrap(), "hello");
        assert_eq!(r.reply("bye", &[]).await.unwrap(), "see you");
        assert!(matches!(
            r.reply("unknown", &[]).await,
            Err(ResponderError::Backend(_))
        ));
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let a = ReplayResponder::from_map(HashMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]));
        let b = ReplayResponder::from_map(HashMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().map(str::len), Some(64));
    }

    #[test]
    fn test_duplicate_prompt_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"prompt": "hi", "response": "a"}}"#).unwrap();
        writeln!(f, r#"{{"prompt": "hi", "response": "b"}}"#).unwrap();
        assert!(ReplayResponder::from_path(f.path()).is_err());
    }
}
