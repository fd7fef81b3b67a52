use crate::model::{
    AuditRun, MatchedPair, MetricsRecord, Probe, ProbeFailure, ProbeOutcome, Response, RunStatus,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

/// Rows removed by a purge, per table.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PurgeCounts {
    pub probes: usize,
    pub responses: usize,
    pub failures: usize,
    pub metrics: usize,
    pub reports: usize,
    pub runs: usize,
}

impl PurgeCounts {
    pub fn total(&self) -> usize {
        self.probes + self.responses + self.failures + self.metrics + self.reports + self.runs
    }
}

const TABLES: [&str; 6] = ["runs", "probes", "responses", "failures", "metrics", "reports"];

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection mutex poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    // --- runs ---

    pub fn insert_run(&self, run: &AuditRun) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs(id, name, status, started_at, ended_at, config_fingerprint, config_json, pair_ids_json, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run.id,
                run.name,
                run.status.as_str(),
                run.started_at.to_rfc3339(),
                run.ended_at.map(|t| t.to_rfc3339()),
                run.config_fingerprint,
                serde_json::to_string(&run.config_snapshot)?,
                serde_json::to_string(&run.pair_ids)?,
                run.error,
            ],
        )
        .with_context(|| format!("insert run {}", run.id))?;
        Ok(())
    }

    /// Persists the run's lifecycle fields (status, end time, pairs, error).
    pub fn update_run(&self, run: &AuditRun) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE runs SET status=?1, ended_at=?2, pair_ids_json=?3, error=?4 WHERE id=?5",
            params![
                run.status.as_str(),
                run.ended_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&run.pair_ids)?,
                run.error,
                run.id
            ],
        )?;
        if n == 0 {
            anyhow::bail!("run {} not found", run.id);
        }
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> anyhow::Result<Option<AuditRun>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, name, status, started_at, ended_at, config_fingerprint, config_json, pair_ids_json, error
                 FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?;
        row.transpose()
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: u32) -> anyhow::Result<Vec<AuditRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, status, started_at, ended_at, config_fingerprint, config_json, pair_ids_json, error
             FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], run_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r??);
        }
        Ok(out)
    }

    // --- probes ---

    pub fn insert_pairs(&self, run_id: &str, pairs: &[MatchedPair]) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO probes(run_id, probe_id, pair_id, group_label, content, fields_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for probe in pairs.iter().flat_map(|p| p.probes.iter()) {
                stmt.execute(params![
                    run_id,
                    probe.id,
                    probe.pair_id,
                    probe.group,
                    probe.content,
                    serde_json::to_string(&probe.fields)?,
                    probe.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_probes(&self, run_id: &str) -> anyhow::Result<Vec<Probe>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT probe_id, pair_id, group_label, content, fields_json, created_at
             FROM probes WHERE run_id = ?1 ORDER BY pair_id, rowid",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (id, pair_id, group, content, fields, created_at) = r?;
            out.push(Probe {
                id,
                pair_id,
                group,
                content,
                fields: serde_json::from_str(&fields).context("probe fields_json")?,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(out)
    }

    // --- responses / failures ---

    /// Writes every outcome of one pair in a single transaction.
    ///
    /// Rows are insert-only: a second outcome for the same probe in the same
    /// run is an error and nothing from the batch is kept.
    pub fn record_pair(&self, outcomes: &[ProbeOutcome]) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for outcome in outcomes {
            match outcome {
                ProbeOutcome::Answered(r) => insert_response(&tx, r)?,
                ProbeOutcome::Failed(f) => insert_failure(&tx, f)?,
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_responses(&self, run_id: &str) -> anyhow::Result<Vec<Response>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, probe_id, pair_id, group_label, text, redacted, latency_ms, attempts, received_at
             FROM responses WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                Response {
                    run_id: row.get(0)?,
                    probe_id: row.get(1)?,
                    pair_id: row.get(2)?,
                    group: row.get(3)?,
                    text: row.get(4)?,
                    redacted: row.get::<_, i64>(5)? != 0,
                    latency_ms: row.get::<_, i64>(6)? as u64,
                    attempts: row.get::<_, i64>(7)? as u32,
                    received_at: Utc::now(),
                },
                row.get::<_, String>(8)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (mut resp, received_at) = r?;
            resp.received_at = parse_ts(&received_at)?;
            out.push(resp);
        }
        Ok(out)
    }

    pub fn fetch_failures(&self, run_id: &str) -> anyhow::Result<Vec<ProbeFailure>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, probe_id, pair_id, group_label, reason, attempts, recorded_at
             FROM failures WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                ProbeFailure {
                    run_id: row.get(0)?,
                    probe_id: row.get(1)?,
                    pair_id: row.get(2)?,
                    group: row.get(3)?,
                    reason: row.get(4)?,
                    attempts: row.get::<_, i64>(5)? as u32,
                    recorded_at: Utc::now(),
                },
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (mut f, recorded_at) = r?;
            f.recorded_at = parse_ts(&recorded_at)?;
            out.push(f);
        }
        Ok(out)
    }

    // --- metrics ---

    /// Appends one metrics row per record. Re-extraction appends again;
    /// reads pick the newest row per probe.
    pub fn insert_metrics(&self, records: &[MetricsRecord]) -> anyhow::Result<()> {
        let extracted_at = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO metrics(run_id, probe_id, group_label, values_json, extracted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for rec in records {
                stmt.execute(params![
                    rec.run_id,
                    rec.probe_id,
                    rec.group,
                    serde_json::to_string(&rec.values)?,
                    extracted_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_metrics(&self, run_id: &str) -> anyhow::Result<Vec<MetricsRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT m.run_id, m.probe_id, m.group_label, m.values_json
             FROM metrics m
             WHERE m.run_id = ?1
               AND m.id = (SELECT MAX(id) FROM metrics WHERE run_id = m.run_id AND probe_id = m.probe_id)
             ORDER BY m.probe_id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (run_id, probe_id, group, values) = r?;
            out.push(MetricsRecord {
                run_id,
                probe_id,
                group,
                values: serde_json::from_str(&values).context("metrics values_json")?,
            });
        }
        Ok(out)
    }

    /// Latest metrics of a run, grouped by label in probe order.
    pub fn metrics_by_group(
        &self,
        run_id: &str,
    ) -> anyhow::Result<BTreeMap<String, Vec<crate::model::Metrics>>> {
        let mut out: BTreeMap<String, Vec<crate::model::Metrics>> = BTreeMap::new();
        for rec in self.fetch_metrics(run_id)? {
            out.entry(rec.group).or_default().push(rec.values);
        }
        Ok(out)
    }

    // --- reports ---

    pub fn insert_report(&self, run_id: &str, report: &serde_json::Value) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reports(run_id, created_at, report_json) VALUES (?1, ?2, ?3)",
            params![run_id, Utc::now().to_rfc3339(), serde_json::to_string(report)?],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn fetch_reports(&self, run_id: &str) -> anyhow::Result<Vec<serde_json::Value>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT report_json FROM reports WHERE run_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![run_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(serde_json::from_str(&r?)?);
        }
        Ok(out)
    }

    // --- purge / retention ---

    /// Deletes every row tagged with `run_id`, the run itself last.
    pub fn delete_run(&self, run_id: &str) -> anyhow::Result<PurgeCounts> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let del = |table: &str| -> anyhow::Result<usize> {
            let key = if table == "runs" { "id" } else { "run_id" };
            let sql = format!("DELETE FROM {} WHERE {} = ?1", table, key);
            Ok(tx.execute(&sql, params![run_id])?)
        };
        let counts = PurgeCounts {
            probes: del("probes")?,
            responses: del("responses")?,
            failures: del("failures")?,
            metrics: del("metrics")?,
            reports: del("reports")?,
            runs: del("runs")?,
        };
        tx.commit()?;
        Ok(counts)
    }

    /// Nulls raw response text received before `cutoff`. Returns rows touched.
    pub fn clear_text_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        let conn = self.lock()?;
        // rfc3339 strings in UTC sort chronologically
        let n = conn.execute(
            "UPDATE responses SET text = NULL WHERE text IS NOT NULL AND received_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(n)
    }

    /// Like `clear_text_before`, limited to one run.
    pub fn clear_run_text_before(
        &self,
        run_id: &str,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<usize> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE responses SET text = NULL
             WHERE run_id = ?1 AND text IS NOT NULL AND received_at < ?2",
            params![run_id, cutoff.to_rfc3339()],
        )?;
        Ok(n)
    }

    pub fn count_rows(&self, table: &str) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        if !TABLES.contains(&table) {
            anyhow::bail!("Invalid table name for count_rows: {}", table);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n)
    }
}

fn insert_response(tx: &rusqlite::Transaction, r: &Response) -> anyhow::Result<()> {
    tx.execute(
        "INSERT INTO responses(run_id, probe_id, pair_id, group_label, text, redacted, latency_ms, attempts, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            r.run_id,
            r.probe_id,
            r.pair_id,
            r.group,
            r.text,
            r.redacted as i64,
            r.latency_ms as i64,
            r.attempts as i64,
            r.received_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("insert response for probe {}", r.probe_id))?;
    Ok(())
}

fn insert_failure(tx: &rusqlite::Transaction, f: &ProbeFailure) -> anyhow::Result<()> {
    tx.execute(
        "INSERT INTO failures(run_id, probe_id, pair_id, group_label, reason, attempts, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            f.run_id,
            f.probe_id,
            f.pair_id,
            f.group,
            f.reason,
            f.attempts as i64,
            f.recorded_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("insert failure for probe {}", f.probe_id))?;
    Ok(())
}

type RunRow = anyhow::Result<AuditRun>;

struct RawRun {
    id: String,
    name: String,
    status: String,
    started_at: String,
    ended_at: Option<String>,
    config_fingerprint: String,
    config_json: String,
    pair_ids_json: String,
    error: Option<String>,
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    let raw = RawRun {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        config_fingerprint: row.get(5)?,
        config_json: row.get(6)?,
        pair_ids_json: row.get(7)?,
        error: row.get(8)?,
    };
    Ok(decode_run(raw))
}

fn decode_run(raw: RawRun) -> RunRow {
    let status = RunStatus::parse(&raw.status)
        .ok_or_else(|| anyhow::anyhow!("run {}: unknown status '{}'", raw.id, raw.status))?;
    Ok(AuditRun {
        status,
        started_at: parse_ts(&raw.started_at)?,
        ended_at: raw.ended_at.as_deref().map(parse_ts).transpose()?,
        config_snapshot: serde_json::from_str(&raw.config_json)?,
        pair_ids: serde_json::from_str(&raw.pair_ids_json)?,
        id: raw.id,
        name: raw.name,
        config_fingerprint: raw.config_fingerprint,
        error: raw.error,
    })
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp '{}'", s))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricValue;

    fn store_with_run() -> (Store, AuditRun) {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let run = AuditRun::new("unit", serde_json::json!({"groups": ["a", "b"]}), "fp");
        store.insert_run(&run).unwrap();
        (store, run)
    }

    fn response(run_id: &str, probe_id: &str, group: &str) -> Response {
        Response {
            run_id: run_id.into(),
            probe_id: probe_id.into(),
            pair_id: "pair-0000".into(),
            group: group.into(),
            text: Some("hello".into()),
            redacted: false,
            latency_ms: 12,
            attempts: 1,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_run_roundtrip_and_update() {
        let (store, mut run) = store_with_run();
        run.transition(RunStatus::Running).unwrap();
        run.pair_ids = vec!["pair-0000".into()];
        store.update_run(&run).unwrap();

        let loaded = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.pair_ids, vec!["pair-0000".to_string()]);
        assert_eq!(loaded.config_snapshot["groups"][1], "b");
        assert!(store.get_run("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_outcome_rolls_back_whole_pair() {
        let (store, run) = store_with_run();
        store
            .record_pair(&[ProbeOutcome::Answered(response(&run.id, "p:a", "a"))])
            .unwrap();

        let err = store.record_pair(&[
            ProbeOutcome::Answered(response(&run.id, "p:b", "b")),
            ProbeOutcome::Answered(response(&run.id, "p:a", "a")),
        ]);
        assert!(err.is_err());
        assert_eq!(store.count_rows("responses").unwrap(), 1);
    }

    #[test]
    fn test_latest_metrics_win() {
        let (store, run) = store_with_run();
        let rec = |v: f64| MetricsRecord {
            run_id: run.id.clone(),
            probe_id: "p:a".into(),
            group: "a".into(),
            values: BTreeMap::from([("length".to_string(), MetricValue::Number(v))]),
        };
        store.insert_metrics(&[rec(1.0)]).unwrap();
        store.insert_metrics(&[rec(2.0)]).unwrap();

        let got = store.fetch_metrics(&run.id).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].values["length"], MetricValue::Number(2.0));
        assert_eq!(store.count_rows("metrics").unwrap(), 2);
    }

    #[test]
    fn test_count_rows_rejects_unknown_table() {
        let (store, _) = store_with_run();
        assert!(store.count_rows("sqlite_master; DROP TABLE runs").is_err());
    }
}
