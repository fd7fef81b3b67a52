use fairprobe_core::analysis::{BiasAnalyzer, Thresholds};
use fairprobe_core::model::{
    AuditRun, ComparisonOutcome, MetricKind, MetricValue, MetricsRecord, SignificanceTest,
};
use fairprobe_core::report::AuditReport;
use fairprobe_core::storage::Store;
use std::collections::BTreeMap;

fn record(run: &str, i: usize, group: &str, sentiment: f64, refusal: bool) -> MetricsRecord {
    MetricsRecord {
        run_id: run.into(),
        probe_id: format!("pair-{:04}:{}", i, group),
        group: group.into(),
        values: BTreeMap::from([
            ("sentiment".to_string(), MetricValue::Number(sentiment)),
            ("refusal".to_string(), MetricValue::Flag(refusal)),
        ]),
    }
}

#[test]
fn test_stored_metrics_flow_into_report() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let run = AuditRun::new("analysis", serde_json::json!({}), "fp");
    store.insert_run(&run)?;

    let mut records = Vec::new();
    for i in 0..20 {
        let jitter = (i % 5) as f64 * 0.02;
        records.push(record(&run.id, i, "majority", 0.6 + jitter, false));
        records.push(record(&run.id, i, "minority", -0.4 + jitter, i % 2 == 0));
    }
    store.insert_metrics(&records)?;

    let groups = vec!["majority".to_string(), "minority".to_string()];
    let analyzer = BiasAnalyzer::new(Thresholds::default());
    let outcomes = analyzer.compare(&groups, &store.metrics_by_group(&run.id)?)?;
    assert_eq!(outcomes.len(), 2);

    let sentiment = outcomes
        .iter()
        .find_map(|o| match o {
            ComparisonOutcome::Computed(c) if c.metric == "sentiment" => Some(c),
            _ => None,
        })
        .unwrap();
    assert_eq!(sentiment.kind, MetricKind::Continuous);
    assert_eq!(sentiment.test, SignificanceTest::WelchT);
    assert!((sentiment.difference.unwrap() + 1.0).abs() < 1e-9);
    assert!(sentiment.p_value < 1e-6);
    assert!(sentiment.bias_detected);

    let refusal = outcomes
        .iter()
        .find_map(|o| match o {
            ComparisonOutcome::Computed(c) if c.metric == "refusal" => Some(c),
            _ => None,
        })
        .unwrap();
    assert_eq!(refusal.test, SignificanceTest::ChiSquare);
    assert!(refusal.bias_detected);

    let report = AuditReport::new(&run.id, groups, *analyzer.thresholds(), outcomes)
        .with_counts(40, 0);
    store.insert_report(&run.id, &report.to_value()?)?;
    store.insert_report(&run.id, &report.to_value()?)?;

    // every analysis appends
    let stored = store.fetch_reports(&run.id)?;
    assert_eq!(stored.len(), 2);
    let back: AuditReport = serde_json::from_value(stored[0].clone())?;
    assert_eq!(back.flagged_metrics(), vec!["refusal", "sentiment"]);
    Ok(())
}
