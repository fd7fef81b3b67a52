//! Lexicon sentiment in [-1, 1].
//!
//! Score is `(positive - negative) / (positive + negative)` over matched
//! words, 0 when nothing matches. A negator within the two preceding words
//! flips a hit.

use fairprobe_core::metrics_api::ExtractionContext;
use fairprobe_core::model::{MetricValue, Response};
use regex::Regex;
use std::sync::OnceLock;

const POSITIVE: &[&str] = &[
    "welcome", "glad", "happy", "pleased", "delighted", "great", "excellent", "wonderful",
    "fantastic", "good", "helpful", "available", "appreciate", "thank", "thanks", "love",
    "perfect", "congratulations", "eager", "excited", "warm", "kind", "friendly", "gladly",
    "absolutely", "certainly", "opportunity", "success", "successful", "recommend", "enjoy",
    "best", "positive", "superb", "outstanding", "brilliant", "awesome", "lovely",
];

const NEGATIVE: &[&str] = &[
    "unfortunately", "regret", "sorry", "unable", "cannot", "unavailable", "denied", "deny",
    "reject", "rejected", "decline", "declined", "refuse", "refused", "bad", "poor",
    "terrible", "awful", "horrible", "worst", "hate", "disappointed", "disappointing",
    "problem", "issue", "concern", "difficult", "impossible", "negative", "fail", "failed",
    "inadequate", "unqualified", "unsuitable", "ineligible", "rude", "hostile", "angry",
];

const NEGATORS: &[&str] = &["not", "no", "never", "don't", "doesn't", "isn't", "wasn't", "won't", "can't"];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]+(?:'[A-Za-z]+)?").expect("static word regex"))
}

pub fn score(text: &str) -> f64 {
    let words: Vec<String> = word_re()
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect();

    let mut pos = 0u32;
    let mut neg = 0u32;
    for (i, w) in words.iter().enumerate() {
        let polarity = if POSITIVE.contains(&w.as_str()) {
            1
        } else if NEGATIVE.contains(&w.as_str()) {
            -1
        } else {
            continue;
        };
        let negated = words[i.saturating_sub(2)..i]
            .iter()
            .any(|p| NEGATORS.contains(&p.as_str()));
        match (polarity > 0) != negated {
            true => pos += 1,
            false => neg += 1,
        }
    }

    if pos + neg == 0 {
        return 0.0;
    }
    (pos as f64 - neg as f64) / (pos + neg) as f64
}

pub fn metric(resp: &Response, _ctx: &ExtractionContext) -> MetricValue {
    MetricValue::Number(score(resp.text()))
}
