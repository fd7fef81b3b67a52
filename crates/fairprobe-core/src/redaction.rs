//! PII guard: pattern scan and idempotent redaction.
//!
//! Used on two edges: generated probes are scanned before they leave the
//! process, and replies can be redacted before they are persisted. The same
//! `redact` backs the at-rest `fairprobe redact` utility.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const PLACEHOLDER: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
    PasswordLike,
    ApiKey,
}

impl PatternKind {
    pub const ALL: [PatternKind; 6] = [
        PatternKind::Email,
        PatternKind::Phone,
        PatternKind::Ssn,
        PatternKind::CreditCard,
        PatternKind::PasswordLike,
        PatternKind::ApiKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Email => "email",
            PatternKind::Phone => "phone",
            PatternKind::Ssn => "ssn",
            PatternKind::CreditCard => "credit-card",
            PatternKind::PasswordLike => "password-like",
            PatternKind::ApiKey => "api-key",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    fn pattern(&self) -> &'static str {
        match self {
            PatternKind::Email => r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}",
            PatternKind::Phone => r"(?:\+\d{1,3}[ .\-]?)?\(?\d{3}\)?[ .\-]?\d{3}[ .\-]\d{4}\b",
            PatternKind::Ssn => r"\b\d{3}-\d{2}-\d{4}\b",
            PatternKind::CreditCard => r"\b(?:\d{4}[ \-]?){3}\d{4}\b",
            PatternKind::PasswordLike => r"(?i)\b(?:password|passwd|pwd|passcode)\s*[:=]\s*\S+",
            PatternKind::ApiKey => r"\b(?:sk|pk|api|key)[_\-][A-Za-z0-9]{16,}\b",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Finding {
    pub kind: PatternKind,
    pub start: usize,
    pub end: usize,
    pub matched: String,
}

#[derive(Debug, Clone)]
pub struct PiiGuard {
    patterns: Vec<(PatternKind, Regex)>,
}

impl Default for PiiGuard {
    fn default() -> Self {
        Self::new(&PatternKind::ALL)
    }
}

impl PiiGuard {
    pub fn new(kinds: &[PatternKind]) -> Self {
        let patterns = kinds
            .iter()
            .map(|k| {
                // built-in patterns are compile-time constants
                let re = Regex::new(k.pattern()).unwrap_or_else(|e| {
                    panic!("built-in {} pattern failed to compile: {}", k, e)
                });
                (*k, re)
            })
            .collect();
        Self { patterns }
    }

    pub fn kinds(&self) -> Vec<PatternKind> {
        self.patterns.iter().map(|(k, _)| *k).collect()
    }

    pub fn scan(&self, text: &str) -> BTreeSet<Finding> {
        let mut out = BTreeSet::new();
        for (kind, re) in &self.patterns {
            for m in re.find_iter(text) {
                out.insert(Finding {
                    kind: *kind,
                    start: m.start(),
                    end: m.end(),
                    matched: m.as_str().to_string(),
                });
            }
        }
        out
    }

    pub fn is_clean(&self, text: &str) -> bool {
        self.patterns.iter().all(|(_, re)| !re.is_match(text))
    }

    /// Replaces every match of the given kinds with [`PLACEHOLDER`].
    ///
    /// Replacement repeats until no pattern matches, so the result is a fixed
    /// point: `redact(redact(x)) == redact(x)` and `scan` finds nothing of
    /// those kinds afterwards. Each pass removes at least one original
    /// character and the placeholder itself matches no pattern, so the loop
    /// terminates.
    pub fn redact(&self, text: &str, kinds: &[PatternKind]) -> String {
        let active: Vec<&Regex> = self
            .patterns
            .iter()
            .filter(|(k, _)| kinds.contains(k))
            .map(|(_, re)| re)
            .collect();

        let mut current = text.to_string();
        loop {
            let mut changed = false;
            for re in &active {
                if re.is_match(&current) {
                    current = re.replace_all(&current, PLACEHOLDER).into_owned();
                    changed = true;
                }
            }
            if !changed {
                return current;
            }
        }
    }

    pub fn redact_all(&self, text: &str) -> String {
        self.redact(text, &self.kinds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_each_kind() {
        let g = PiiGuard::default();
        let text = "mail jane.doe@example.org or call 555-123-4567, ssn 123-45-6789, \
                    card 4111 1111 1111 1111, password: hunter2, key sk_abcdefghijklmnop1234";
        let kinds: BTreeSet<PatternKind> = g.scan(text).into_iter().map(|f| f.kind).collect();
        for k in PatternKind::ALL {
            assert!(kinds.contains(&k), "missing {}", k);
        }
    }

    #[test]
    fn test_clean_synthetic_text() {
        let g = PiiGuard::default();
        assert!(g.is_clean(
            "Hello, my name is Jamal Jones. I am interested in the waiting list at Riverside Apartments."
        ));
    }

    #[test]
    fn test_redact_is_idempotent_and_clean() {
        let g = PiiGuard::default();
        let text = "password: a@b.co then password=[x] and 555 123 4567";
        let once = g.redact_all(text);
        assert_eq!(g.redact_all(&once), once);
        assert!(g.scan(&once).is_empty(), "{:?}", g.scan(&once));
        assert!(once.contains(PLACEHOLDER));
    }

    #[test]
    fn test_redact_only_requested_kinds() {
        let g = PiiGuard::default();
        let out = g.redact("a@b.com 123-45-6789", &[PatternKind::Email]);
        assert_eq!(out, "[REDACTED] 123-45-6789");
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(PatternKind::parse("password-like"), Some(PatternKind::PasswordLike));
        assert_eq!(PatternKind::parse("nope"), None);
    }
}
