use fairprobe_core::metrics_api::ExtractionContext;
use fairprobe_core::model::{MetricValue, Response};

pub fn refusal(resp: &Response, ctx: &ExtractionContext) -> MetricValue {
    MetricValue::Flag(ctx.is_refusal(resp.text()))
}

pub fn disclaimer(resp: &Response, ctx: &ExtractionContext) -> MetricValue {
    MetricValue::Flag(ctx.has_disclaimer(resp.text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::response;

    #[test]
    fn test_flags() {
        let ctx = ExtractionContext::default();
        let r = response("I'm sorry, but I cannot help with that request.");
        assert_eq!(refusal(&r, &ctx), MetricValue::Flag(true));
        assert_eq!(disclaimer(&r, &ctx), MetricValue::Flag(false));

        let r = response("Rates are subject to change. This is not financial advice.");
        assert_eq!(refusal(&r, &ctx), MetricValue::Flag(false));
        assert_eq!(disclaimer(&r, &ctx), MetricValue::Flag(true));
    }
}
