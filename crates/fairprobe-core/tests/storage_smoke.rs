use chrono::{Duration, Utc};
use fairprobe_core::model::{
    AuditRun, MatchedPair, MetricValue, MetricsRecord, Probe, ProbeFailure, ProbeOutcome,
    Response, RunStatus,
};
use fairprobe_core::purge::Purger;
use fairprobe_core::storage::Store;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn probe(pair: &str, group: &str) -> Probe {
    Probe {
        id: format!("{}:{}", pair, group),
        pair_id: pair.into(),
        group: group.into(),
        content: format!("probe for {}", group),
        fields: BTreeMap::new(),
        created_at: Utc::now(),
    }
}

fn response(run: &str, p: &Probe, text: &str, received_days_ago: i64) -> Response {
    Response {
        run_id: run.into(),
        probe_id: p.id.clone(),
        pair_id: p.pair_id.clone(),
        group: p.group.clone(),
        text: Some(text.into()),
        redacted: false,
        latency_ms: 120,
        attempts: 1,
        received_at: Utc::now() - Duration::days(received_days_ago),
    }
}

#[test]
fn test_storage_smoke_lifecycle() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("fairprobe.db");

    // 1. open and create schema
    let store = Store::open(&db_path)?;
    store.init_schema()?;

    // 2. run with one pair
    let mut run = AuditRun::new("smoke", serde_json::json!({"groups": ["a", "b"]}), "fp");
    let pair = MatchedPair {
        id: "pair-0000".into(),
        probes: vec![probe("pair-0000", "a"), probe("pair-0000", "b")],
    };
    run.pair_ids = vec![pair.id.clone()];
    store.insert_run(&run)?;
    store.insert_pairs(&run.id, std::slice::from_ref(&pair))?;
    run.transition(RunStatus::Running)?;
    store.update_run(&run)?;

    // 3. one answered, one failed, written together
    let answered = response(&run.id, &pair.probes[0], "Yes, we have openings.", 0);
    let failed = ProbeFailure {
        run_id: run.id.clone(),
        probe_id: pair.probes[1].id.clone(),
        pair_id: pair.id.clone(),
        group: "b".into(),
        reason: "backend unavailable".into(),
        attempts: 3,
        recorded_at: Utc::now(),
    };
    store.record_pair(&[
        ProbeOutcome::Answered(answered.clone()),
        ProbeOutcome::Failed(failed),
    ])?;
    store.insert_metrics(&[MetricsRecord {
        run_id: run.id.clone(),
        probe_id: answered.probe_id.clone(),
        group: "a".into(),
        values: BTreeMap::from([("length".to_string(), MetricValue::Number(22.0))]),
    }])?;
    run.transition(RunStatus::Completed)?;
    store.update_run(&run)?;
    drop(store);

    // 4. reopen and scan
    let store = Store::open(&db_path)?;
    store.init_schema()?;
    let runs = store.list_runs(10)?;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(store.fetch_responses(&run.id)?, vec![answered]);
    assert_eq!(store.fetch_failures(&run.id)?.len(), 1);
    let by_group = store.metrics_by_group(&run.id)?;
    assert_eq!(by_group["a"].len(), 1);
    assert!(!by_group.contains_key("b"));

    // 5. purge
    let counts = Purger::new(store.clone()).purge_run(&run.id)?;
    assert_eq!(counts.runs, 1);
    assert_eq!(counts.probes, 2);
    assert_eq!(counts.responses, 1);
    assert_eq!(counts.failures, 1);
    assert_eq!(counts.metrics, 1);
    assert!(store.get_run(&run.id)?.is_none());
    for table in ["runs", "probes", "responses", "failures", "metrics", "reports"] {
        assert_eq!(store.count_rows(table)?, 0, "{} not purged", table);
    }
    Ok(())
}

#[test]
fn test_expire_raw_text_keeps_metrics() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let run = AuditRun::new("expire", serde_json::json!({}), "fp");
    let pair = MatchedPair {
        id: "pair-0000".into(),
        probes: vec![probe("pair-0000", "a"), probe("pair-0000", "b")],
    };
    store.insert_run(&run)?;
    store.insert_pairs(&run.id, std::slice::from_ref(&pair))?;
    store.record_pair(&[
        ProbeOutcome::Answered(response(&run.id, &pair.probes[0], "old reply", 40)),
        ProbeOutcome::Answered(response(&run.id, &pair.probes[1], "new reply", 1)),
    ])?;
    store.insert_metrics(&[MetricsRecord {
        run_id: run.id.clone(),
        probe_id: pair.probes[0].id.clone(),
        group: "a".into(),
        values: BTreeMap::from([("length".to_string(), MetricValue::Number(9.0))]),
    }])?;

    let n = Purger::new(store.clone()).expire_raw_text(Duration::days(30))?;
    assert_eq!(n, 1);

    let responses = store.fetch_responses(&run.id)?;
    let old = responses.iter().find(|r| r.group == "a").unwrap();
    let new = responses.iter().find(|r| r.group == "b").unwrap();
    assert!(old.text.is_none());
    assert_eq!(new.text.as_deref(), Some("new reply"));
    assert_eq!(store.fetch_metrics(&run.id)?.len(), 1);
    Ok(())
}

#[test]
fn test_configured_window_clears_only_that_run() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let windowed = AuditRun::new(
        "windowed",
        serde_json::json!({"retention": {"store_raw_text": true, "raw_text_days": 30}}),
        "fp",
    );
    let unbounded = AuditRun::new(
        "unbounded",
        serde_json::json!({"retention": {"store_raw_text": true}}),
        "fp",
    );
    for run in [&windowed, &unbounded] {
        let pair = MatchedPair {
            id: "pair-0000".into(),
            probes: vec![probe("pair-0000", "a"), probe("pair-0000", "b")],
        };
        store.insert_run(run)?;
        store.insert_pairs(&run.id, std::slice::from_ref(&pair))?;
        store.record_pair(&[
            ProbeOutcome::Answered(response(&run.id, &pair.probes[0], "old reply", 40)),
            ProbeOutcome::Answered(response(&run.id, &pair.probes[1], "new reply", 1)),
        ])?;
    }

    let n = Purger::new(store.clone()).expire_configured_raw_text()?;
    assert_eq!(n, 1);

    let cleared = store.fetch_responses(&windowed.id)?;
    assert!(cleared.iter().find(|r| r.group == "a").unwrap().text.is_none());
    assert_eq!(
        cleared.iter().find(|r| r.group == "b").unwrap().text.as_deref(),
        Some("new reply")
    );
    assert!(store
        .fetch_responses(&unbounded.id)?
        .iter()
        .all(|r| r.text.is_some()));
    Ok(())
}
