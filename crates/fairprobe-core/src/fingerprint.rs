use crate::config::AuditConfig;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub hex: String,
    pub components: Vec<String>,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// serde_json objects are key-sorted, so this is stable across field order
/// in the source YAML.
fn canonical<T: Serialize>(v: &T) -> String {
    serde_json::to_value(v)
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Fingerprint of everything that decides which probes are sent where and
/// how they are judged. Worker counts, timeouts and retention do not change
/// the audit and are left out.
pub fn config_fingerprint(cfg: &AuditConfig) -> Fingerprint {
    let mut parts = Vec::new();

    parts.push(format!("name={}", cfg.name));
    parts.push(format!("provider={}", cfg.backend.provider));
    parts.push(format!("model={}", cfg.backend.model));
    parts.push(format!(
        "temperature={}",
        cfg.backend
            .temperature
            .map(|t| t.to_string())
            .unwrap_or_default()
    ));
    parts.push(format!("groups={}", cfg.groups.join(",")));
    parts.push(format!("pairs={}", cfg.pairs));
    parts.push(format!(
        "seed={}",
        cfg.seed.map(|s| s.to_string()).unwrap_or_default()
    ));
    parts.push(format!("template={}", canonical(&cfg.template)));
    parts.push(format!("analysis={}", canonical(&cfg.analysis)));
    parts.push(format!("extraction={}", canonical(&cfg.extraction)));

    // metric definitions change with the tool
    parts.push(format!("fairprobe_version={}", env!("CARGO_PKG_VERSION")));

    let raw = parts.join("\n");
    Fingerprint {
        hex: sha256_hex(&raw),
        components: parts,
    }
}

/// What an AuditRun records about the config it was started with.
pub fn config_snapshot(cfg: &AuditConfig) -> serde_json::Value {
    serde_json::json!({
        "name": cfg.name,
        "backend": {
            "provider": cfg.backend.provider,
            "model": cfg.backend.model,
            "temperature": cfg.backend.temperature,
            "max_tokens": cfg.backend.max_tokens,
        },
        "groups": cfg.groups,
        "pairs": cfg.pairs,
        "seed": cfg.seed,
        "template": cfg.template,
        "analysis": cfg.analysis,
        "extraction": cfg.extraction,
        "retention": cfg.retention,
    })
}
