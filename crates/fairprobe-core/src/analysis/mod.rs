//! Bias Analyzer: per-metric group comparisons.
//!
//! Continuous metrics get Welch's t-test and Cohen's d, flags and categories
//! get a chi-square test of independence and Cramér's V. The first group is
//! the reference; every other group is compared against it.

pub mod chi2;
pub mod effect;
pub mod special;
pub mod ttest;

use crate::config::AnalysisConfig;
use crate::errors::AuditError;
use crate::model::{
    ComparisonOutcome, EffectSizeKind, GroupComparison, GroupLabel, GroupSummary, MetricKind,
    MetricValue, Metrics, SignificanceTest,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub alpha: f64,
    pub min_effect_size: f64,
    pub min_samples: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            min_effect_size: 0.2,
            min_samples: 2,
        }
    }
}

impl From<&AnalysisConfig> for Thresholds {
    fn from(cfg: &AnalysisConfig) -> Self {
        Self {
            alpha: cfg.alpha,
            min_effect_size: cfg.min_effect_size,
            min_samples: cfg.min_samples.max(2),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BiasAnalyzer {
    thresholds: Thresholds,
}

impl BiasAnalyzer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// One outcome per metric present in every group, for each non-reference
    /// group. Metrics lacking a sample in some group come back as
    /// `Insufficient` while the rest are still computed.
    pub fn compare(
        &self,
        groups: &[GroupLabel],
        metrics_by_group: &BTreeMap<GroupLabel, Vec<Metrics>>,
    ) -> Result<Vec<ComparisonOutcome>, AuditError> {
        if groups.len() < 2 {
            return Err(AuditError::Configuration(format!(
                "need at least two groups to compare, got {:?}",
                groups
            )));
        }
        let empty = Vec::new();
        let series: Vec<&Vec<Metrics>> = groups
            .iter()
            .map(|g| metrics_by_group.get(g).unwrap_or(&empty))
            .collect();

        let names = shared_metric_names(&series);
        let (reference, others) = groups.split_first().ok_or_else(|| {
            AuditError::Configuration("no reference group".into())
        })?;

        let mut out = Vec::new();
        for name in &names {
            let ref_values = column(series[0], name);
            for (i, other) in others.iter().enumerate() {
                let values = column(series[i + 1], name);
                match self.compare_metric(
                    name,
                    (reference.as_str(), ref_values.as_slice()),
                    (other.as_str(), values.as_slice()),
                ) {
                    Ok(c) => out.push(ComparisonOutcome::Computed(c)),
                    Err(AuditError::InsufficientSample {
                        metric,
                        group,
                        count,
                        required,
                    }) => {
                        tracing::warn!(
                            event = "fairprobe.analysis.insufficient_sample",
                            metric = %metric,
                            group = %group,
                            count,
                            required,
                        );
                        out.push(ComparisonOutcome::Insufficient {
                            metric,
                            group,
                            count,
                            required,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::info!(
            event = "fairprobe.analysis.completed",
            metrics = names.len(),
            comparisons = out.len(),
            flagged = out.iter().filter(|o| o.bias_detected()).count(),
        );
        Ok(out)
    }

    /// Compares one metric between a reference group and another group.
    pub fn compare_metric(
        &self,
        metric: &str,
        reference: (&str, &[MetricValue]),
        other: (&str, &[MetricValue]),
    ) -> Result<GroupComparison, AuditError> {
        let required = self.thresholds.min_samples;
        for (group, values) in [reference, other] {
            if values.len() < required {
                return Err(AuditError::InsufficientSample {
                    metric: metric.to_string(),
                    group: group.to_string(),
                    count: values.len(),
                    required,
                });
            }
        }

        let numeric = |vs: &[MetricValue]| -> Option<Vec<f64>> {
            vs.iter()
                .map(|v| match v {
                    MetricValue::Number(n) if n.is_finite() => Some(*n),
                    _ => None,
                })
                .collect()
        };

        match (numeric(reference.1), numeric(other.1)) {
            (Some(a), Some(b)) => Ok(self.continuous(
                metric,
                (reference.0, a.as_slice()),
                (other.0, b.as_slice()),
            )),
            _ => Ok(self.categorical(metric, reference, other)),
        }
    }

    fn continuous(&self, metric: &str, a: (&str, &[f64]), b: (&str, &[f64])) -> GroupComparison {
        let w = ttest::welch(a.1, b.1);
        let d = effect::cohens_d(a.1, b.1);
        let (ma, mb) = (ttest::mean(a.1), ttest::mean(b.1));

        GroupComparison {
            metric: metric.to_string(),
            kind: MetricKind::Continuous,
            groups: vec![numeric_summary(a.0, a.1), numeric_summary(b.0, b.1)],
            difference: Some(mb - ma),
            ratio: ratio(ma, mb),
            test: SignificanceTest::WelchT,
            statistic: w.t,
            degrees_of_freedom: w.df,
            p_value: w.p_value,
            effect_size_kind: EffectSizeKind::CohensD,
            effect_size: d,
            bias_detected: self.flag(w.p_value, d),
        }
    }

    fn categorical(
        &self,
        metric: &str,
        a: (&str, &[MetricValue]),
        b: (&str, &[MetricValue]),
    ) -> GroupComparison {
        let ca = counts(a.1);
        let cb = counts(b.1);
        let categories: BTreeSet<&String> = ca.keys().chain(cb.keys()).collect();
        let table: Vec<Vec<f64>> = [&ca, &cb]
            .iter()
            .map(|c| {
                categories
                    .iter()
                    .map(|k| c.get(*k).copied().unwrap_or(0) as f64)
                    .collect()
            })
            .collect();

        let chi = chi2::independence(&table);
        let v = effect::cramers_v(chi.raw_statistic, chi.n, chi.rows, chi.cols);

        let sa = categorical_summary(a.0, a.1, ca);
        let sb = categorical_summary(b.0, b.1, cb);
        let (difference, ratio) = match (sa.mean, sb.mean) {
            (Some(ma), Some(mb)) => (Some(mb - ma), ratio(ma, mb)),
            _ => (None, None),
        };

        GroupComparison {
            metric: metric.to_string(),
            kind: MetricKind::Categorical,
            groups: vec![sa, sb],
            difference,
            ratio,
            test: SignificanceTest::ChiSquare,
            statistic: chi.statistic,
            degrees_of_freedom: chi.df,
            p_value: chi.p_value,
            effect_size_kind: EffectSizeKind::CramersV,
            effect_size: v,
            bias_detected: self.flag(chi.p_value, v),
        }
    }

    fn flag(&self, p_value: f64, effect: f64) -> bool {
        p_value < self.thresholds.alpha && effect.abs() > self.thresholds.min_effect_size
    }
}

// Groups with no records at all do not narrow the set; they surface as
// insufficient samples instead.
fn shared_metric_names(series: &[&Vec<Metrics>]) -> BTreeSet<String> {
    let mut per_group = series.iter().filter(|ms| !ms.is_empty()).map(|ms| {
        ms.iter()
            .flat_map(|m| m.keys().cloned())
            .collect::<BTreeSet<String>>()
    });
    let first = per_group.next().unwrap_or_default();
    per_group.fold(first, |acc, s| acc.intersection(&s).cloned().collect())
}

fn column(series: &[Metrics], name: &str) -> Vec<MetricValue> {
    series.iter().filter_map(|m| m.get(name).cloned()).collect()
}

fn ratio(reference_mean: f64, other_mean: f64) -> Option<f64> {
    if reference_mean == 0.0 {
        None
    } else {
        Some(other_mean / reference_mean)
    }
}

fn numeric_summary(group: &str, xs: &[f64]) -> GroupSummary {
    GroupSummary {
        group: group.to_string(),
        count: xs.len(),
        mean: Some(ttest::mean(xs)),
        variance: Some(ttest::variance(xs)),
        categories: None,
    }
}

fn counts(values: &[MetricValue]) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for v in values {
        *out.entry(v.label()).or_insert(0) += 1;
    }
    out
}

fn categorical_summary(
    group: &str,
    values: &[MetricValue],
    categories: BTreeMap<String, usize>,
) -> GroupSummary {
    // flags and numbers have a numeric view; free-form categories do not
    let numeric: Option<Vec<f64>> = values.iter().map(|v| v.as_f64()).collect();
    GroupSummary {
        group: group.to_string(),
        count: values.len(),
        mean: numeric.as_deref().map(ttest::mean),
        variance: numeric.as_deref().map(ttest::variance),
        categories: Some(categories),
    }
}
