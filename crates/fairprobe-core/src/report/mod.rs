//! Analysis reports: one record per metric comparison, rendered as JSON,
//! Markdown or a console summary.

pub mod console;
pub mod json;
pub mod markdown;

use crate::analysis::Thresholds;
use crate::model::{ComparisonOutcome, GroupLabel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    /// Configured order; the first is the reference group.
    pub groups: Vec<GroupLabel>,
    pub thresholds: Thresholds,
    /// Responses the metrics were taken from.
    pub responses: usize,
    /// Probes that ended without a response.
    pub failures: usize,
    pub outcomes: Vec<ComparisonOutcome>,
}

impl AuditReport {
    pub fn new(
        run_id: &str,
        groups: Vec<GroupLabel>,
        thresholds: Thresholds,
        outcomes: Vec<ComparisonOutcome>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            generated_at: Utc::now(),
            groups,
            thresholds,
            responses: 0,
            failures: 0,
            outcomes,
        }
    }

    pub fn with_counts(mut self, responses: usize, failures: usize) -> Self {
        self.responses = responses;
        self.failures = failures;
        self
    }

    pub fn bias_detected(&self) -> bool {
        self.outcomes.iter().any(|o| o.bias_detected())
    }

    /// Metrics flagged in at least one comparison, deduplicated, in report order.
    pub fn flagged_metrics(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for o in &self.outcomes {
            if o.bias_detected() && !out.contains(&o.metric()) {
                out.push(o.metric());
            }
        }
        out
    }

    pub fn to_value(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::model::{
        EffectSizeKind, GroupComparison, GroupSummary, MetricKind, SignificanceTest,
    };

    pub fn comparison(metric: &str, p: f64, d: f64, flagged: bool) -> ComparisonOutcome {
        ComparisonOutcome::Computed(GroupComparison {
            metric: metric.into(),
            kind: MetricKind::Continuous,
            groups: vec![
                GroupSummary {
                    group: "majority".into(),
                    count: 10,
                    mean: Some(0.5),
                    variance: Some(0.01),
                    categories: None,
                },
                GroupSummary {
                    group: "minority".into(),
                    count: 10,
                    mean: Some(0.3),
                    variance: Some(0.01),
                    categories: None,
                },
            ],
            difference: Some(-0.2),
            ratio: Some(0.6),
            test: SignificanceTest::WelchT,
            statistic: -4.47,
            degrees_of_freedom: 18.0,
            p_value: p,
            effect_size_kind: EffectSizeKind::CohensD,
            effect_size: d,
            bias_detected: flagged,
        })
    }

    pub fn report() -> AuditReport {
        AuditReport::new(
            "hiring-20260101T000000-00000001",
            vec!["majority".into(), "minority".into()],
            Thresholds::default(),
            vec![
                comparison("sentiment", 0.0003, -2.0, true),
                comparison("length", 0.8, 0.05, false),
                ComparisonOutcome::Insufficient {
                    metric: "refusal".into(),
                    group: "minority".into(),
                    count: 1,
                    required: 2,
                },
            ],
        )
        .with_counts(20, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::report;
    use super::*;

    #[test]
    fn test_flagged_metrics() {
        let r = report();
        assert!(r.bias_detected());
        assert_eq!(r.flagged_metrics(), vec!["sentiment"]);
    }

    #[test]
    fn test_report_survives_json() {
        let r = report();
        let v = r.to_value().unwrap();
        assert_eq!(v["outcomes"][0]["status"], "computed");
        assert_eq!(v["outcomes"][2]["status"], "insufficient");
        let back: AuditReport = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
