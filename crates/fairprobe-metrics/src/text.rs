use fairprobe_core::metrics_api::ExtractionContext;
use fairprobe_core::model::{MetricValue, Response};

pub fn length(resp: &Response, _ctx: &ExtractionContext) -> MetricValue {
    MetricValue::Number(resp.text().chars().count() as f64)
}

pub fn word_count(resp: &Response, _ctx: &ExtractionContext) -> MetricValue {
    MetricValue::Number(resp.text().split_whitespace().count() as f64)
}

/// Whitespace-only counts as empty.
pub fn empty(resp: &Response, _ctx: &ExtractionContext) -> MetricValue {
    MetricValue::Flag(resp.is_empty())
}

pub fn latency_ms(resp: &Response, _ctx: &ExtractionContext) -> MetricValue {
    MetricValue::Number(resp.latency_ms as f64)
}

#[cfg(test)]
pub(crate) fn response(text: &str) -> Response {
    Response {
        run_id: "run".into(),
        probe_id: "pair-0000:majority".into(),
        pair_id: "pair-0000".into(),
        group: "majority".into(),
        text: Some(text.into()),
        redacted: false,
        latency_ms: 250,
        attempts: 1,
        received_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let ctx = ExtractionContext::default();
        let r = response("Héllo there,  friend.\n");
        assert_eq!(length(&r, &ctx), MetricValue::Number(22.0));
        assert_eq!(word_count(&r, &ctx), MetricValue::Number(3.0));
        assert_eq!(empty(&r, &ctx), MetricValue::Flag(false));
        assert_eq!(latency_ms(&r, &ctx), MetricValue::Number(250.0));
        assert_eq!(empty(&response("  \n"), &ctx), MetricValue::Flag(true));
    }
}
