//! Metric functions for the extractor and the default registry.
//!
//! Every metric is a pure function of one stored response.

use fairprobe_core::metrics_api::{MetricFn, MetricRegistry};

pub mod formality;
pub mod refusal;
pub mod sentiment;
pub mod text;

pub fn default_registry() -> MetricRegistry {
    let mut r = MetricRegistry::new();
    r.insert("length", text::length as MetricFn);
    r.insert("word_count", text::word_count as MetricFn);
    r.insert("empty", text::empty as MetricFn);
    r.insert("latency_ms", text::latency_ms as MetricFn);
    r.insert("sentiment", sentiment::metric as MetricFn);
    r.insert("formality", formality::metric as MetricFn);
    r.insert("refusal", refusal::refusal as MetricFn);
    r.insert("disclaimer", refusal::disclaimer as MetricFn);
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_names() {
        let names: Vec<&str> = default_registry().keys().copied().collect();
        assert_eq!(
            names,
            vec![
                "disclaimer",
                "empty",
                "formality",
                "latency_ms",
                "length",
                "refusal",
                "sentiment",
                "word_count"
            ]
        );
    }
}
