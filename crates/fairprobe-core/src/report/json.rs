use super::AuditReport;
use std::path::Path;

pub fn write_json(report: &AuditReport, out: &Path) -> anyhow::Result<()> {
    std::fs::write(out, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

pub fn read_json(path: &Path) -> anyhow::Result<AuditReport> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
