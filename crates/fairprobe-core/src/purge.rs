//! Out-of-band deletion and redaction of persisted audit data.

use crate::config::RetentionConfig;
use crate::errors::{storage, AuditError};
use crate::redaction::{PatternKind, PiiGuard};
use crate::storage::{PurgeCounts, Store};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedactOutcome {
    pub findings: usize,
    pub changed: bool,
}

pub struct Purger {
    store: Store,
    guard: PiiGuard,
}

impl Purger {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            guard: PiiGuard::default(),
        }
    }

    /// Removes every row tagged with `run_id`. Purging an unknown run is not
    /// an error; the counts are all zero.
    pub fn purge_run(&self, run_id: &str) -> Result<PurgeCounts, AuditError> {
        let counts = self.store.delete_run(run_id).map_err(storage)?;
        tracing::info!(
            event = "fairprobe.purge.run",
            run_id = %run_id,
            responses = counts.responses,
            metrics = counts.metrics,
            reports = counts.reports,
            total = counts.total(),
        );
        Ok(counts)
    }

    pub fn redact_file(&self, path: &Path, kinds: &[PatternKind]) -> Result<RedactOutcome, AuditError> {
        redact_file(&self.guard, path, kinds)
    }

    /// Drops stored raw text older than `older_than`. Metrics already stored
    /// for those responses stay, but can no longer be recomputed.
    pub fn expire_raw_text(&self, older_than: Duration) -> Result<usize, AuditError> {
        let cutoff = Utc::now() - older_than;
        let n = self.store.clear_text_before(cutoff).map_err(storage)?;
        if n > 0 {
            tracing::warn!(
                event = "fairprobe.retention.raw_text_expired",
                responses = n,
                cutoff = %cutoff.to_rfc3339(),
                "raw text removed; metrics for these responses cannot be recomputed"
            );
        }
        Ok(n)
    }

    /// Applies the `retention.raw_text_days` window each stored run was
    /// started with. Runs without a window keep their text.
    pub fn expire_configured_raw_text(&self) -> Result<usize, AuditError> {
        let now = Utc::now();
        let mut total = 0;
        for run in self.store.list_runs(u32::MAX).map_err(storage)? {
            let Some(days) = raw_text_days(&run.config_snapshot) else {
                continue;
            };
            let cutoff = now - Duration::days(i64::from(days));
            let n = self
                .store
                .clear_run_text_before(&run.id, cutoff)
                .map_err(storage)?;
            if n > 0 {
                tracing::warn!(
                    event = "fairprobe.retention.raw_text_expired",
                    run_id = %run.id,
                    responses = n,
                    raw_text_days = days,
                    "raw text removed; metrics for these responses cannot be recomputed"
                );
            }
            total += n;
        }
        Ok(total)
    }
}

fn raw_text_days(snapshot: &serde_json::Value) -> Option<u32> {
    let retention = snapshot.get("retention")?.clone();
    serde_json::from_value::<RetentionConfig>(retention)
        .ok()?
        .raw_text_days
}

/// Rewrites `path` with every match of `kinds` replaced. The new content
/// goes to a sibling file first and is renamed over the original, so the
/// file is never left half written.
pub fn redact_file(
    guard: &PiiGuard,
    path: &Path,
    kinds: &[PatternKind],
) -> Result<RedactOutcome, AuditError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| storage(anyhow::anyhow!("failed to read {}: {}", path.display(), e)))?;

    let findings = guard
        .scan(&raw)
        .into_iter()
        .filter(|f| kinds.contains(&f.kind))
        .count();
    if findings == 0 {
        return Ok(RedactOutcome::default());
    }

    let redacted = guard.redact(&raw, kinds);
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".redact-tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, &redacted)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            storage(anyhow::anyhow!("failed to rewrite {}: {}", path.display(), e))
        })?;

    tracing::info!(
        event = "fairprobe.purge.redacted_file",
        path = %path.display(),
        findings,
    );
    Ok(RedactOutcome {
        findings,
        changed: redacted != raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.jsonl");
        std::fs::write(
            &path,
            "{\"text\":\"write to jane@example.org\"}\n{\"text\":\"call 555-123-4567\"}\n",
        )
        .unwrap();

        let purger = Purger::new(Store::memory().unwrap());
        let out = purger.redact_file(&path, &[PatternKind::Email]).unwrap();
        assert_eq!(out.findings, 1);
        assert!(out.changed);

        let after = std::fs::read_to_string(&path).unwrap();
        assert!(after.contains("write to [REDACTED]"));
        // kinds not asked for are left alone
        assert!(after.contains("555-123-4567"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let again = purger.redact_file(&path, &[PatternKind::Email]).unwrap();
        assert_eq!(again, RedactOutcome::default());
    }

    #[test]
    fn test_redact_missing_file_is_storage_error() {
        let purger = Purger::new(Store::memory().unwrap());
        let err = purger
            .redact_file(Path::new("/nonexistent/fairprobe.txt"), &PatternKind::ALL)
            .unwrap_err();
        assert!(matches!(err, AuditError::Storage(_)));
    }

    #[test]
    fn test_raw_text_days_read_from_snapshot() {
        let snap = serde_json::json!({"retention": {"store_raw_text": true, "raw_text_days": 14}});
        assert_eq!(raw_text_days(&snap), Some(14));
        assert_eq!(raw_text_days(&serde_json::json!({"retention": {}})), None);
        assert_eq!(raw_text_days(&serde_json::json!({})), None);
    }

    #[test]
    fn test_purge_unknown_run_is_empty() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let counts = Purger::new(store).purge_run("nope").unwrap();
        assert_eq!(counts.total(), 0);
    }
}
