use crate::errors::AuditError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type GroupLabel = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Probe {
    pub id: String,
    pub pair_id: String,
    pub group: GroupLabel,
    pub content: String,
    /// Structured fields the content was rendered from (shared slots plus the
    /// controlled variable).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedPair {
    pub id: String,
    /// One probe per group, in configured group order.
    pub probes: Vec<Probe>,
}

impl MatchedPair {
    /// Checks that the pair holds exactly one probe per configured group.
    pub fn validate(&self, groups: &[GroupLabel]) -> Result<(), AuditError> {
        let mut actual: Vec<String> = self.probes.iter().map(|p| p.group.clone()).collect();
        let mut expected: Vec<String> = groups.to_vec();
        actual.sort();
        expected.sort();
        if actual != expected {
            return Err(AuditError::InvalidGroupSet { expected, actual });
        }
        if let Some(p) = self.probes.iter().find(|p| p.pair_id != self.id) {
            return Err(AuditError::Configuration(format!(
                "probe {} belongs to pair {}, not {}",
                p.id, p.pair_id, self.id
            )));
        }
        Ok(())
    }

    pub fn probe_for(&self, group: &str) -> Option<&Probe> {
        self.probes.iter().find(|p| p.group == group)
    }
}

/// One prior exchange in a conversation handed to a responder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub user: String,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub run_id: String,
    pub probe_id: String,
    pub pair_id: String,
    pub group: GroupLabel,
    /// `None` when the retention policy forbids keeping raw text.
    pub text: Option<String>,
    #[serde(default)]
    pub redacted: bool,
    pub latency_ms: u64,
    pub attempts: u32,
    pub received_at: DateTime<Utc>,
}

impl Response {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeFailure {
    pub run_id: String,
    pub probe_id: String,
    pub pair_id: String,
    pub group: GroupLabel,
    pub reason: String,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Terminal result for one probe within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Answered(Response),
    Failed(ProbeFailure),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Flag(bool),
    Number(f64),
    Category(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            MetricValue::Number(n) => Some(*n),
            MetricValue::Category(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            MetricValue::Flag(b) => b.to_string(),
            MetricValue::Number(n) => n.to_string(),
            MetricValue::Category(c) => c.clone(),
        }
    }
}

pub type Metrics = BTreeMap<String, MetricValue>;

/// Metrics derived from exactly one stored response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsRecord {
    pub run_id: String,
    pub probe_id: String,
    pub group: GroupLabel,
    pub values: Metrics,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Continuous,
    Categorical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceTest {
    WelchT,
    ChiSquare,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EffectSizeKind {
    CohensD,
    CramersV,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    pub group: GroupLabel,
    pub count: usize,
    /// Mean of the numeric view (flags count as 0/1); absent for free-form categories.
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupComparison {
    pub metric: String,
    pub kind: MetricKind,
    /// Reference group first, compared group second.
    pub groups: Vec<GroupSummary>,
    /// Compared mean minus reference mean.
    pub difference: Option<f64>,
    /// Compared mean over reference mean.
    pub ratio: Option<f64>,
    pub test: SignificanceTest,
    #[serde(with = "nonfinite")]
    pub statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
    pub effect_size_kind: EffectSizeKind,
    #[serde(with = "nonfinite")]
    pub effect_size: f64,
    pub bias_detected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Computed(GroupComparison),
    Insufficient {
        metric: String,
        group: GroupLabel,
        count: usize,
        required: usize,
    },
}

impl ComparisonOutcome {
    pub fn metric(&self) -> &str {
        match self {
            ComparisonOutcome::Computed(c) => &c.metric,
            ComparisonOutcome::Insufficient { metric, .. } => metric,
        }
    }

    pub fn bias_detected(&self) -> bool {
        matches!(self, ComparisonOutcome::Computed(c) if c.bias_detected)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Created => "created",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(RunStatus::Created),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "cancelled" => Some(RunStatus::Cancelled),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Created, RunStatus::Running)
                | (RunStatus::Created, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Cancelled)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub id: String,
    pub name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub config_fingerprint: String,
    /// Groups, template and backend the run was started with.
    pub config_snapshot: serde_json::Value,
    #[serde(default)]
    pub pair_ids: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AuditRun {
    pub fn new(name: &str, config_snapshot: serde_json::Value, config_fingerprint: &str) -> Self {
        let started_at = Utc::now();
        Self {
            id: new_run_id(name, &started_at),
            name: name.to_string(),
            status: RunStatus::Created,
            started_at,
            ended_at: None,
            config_fingerprint: config_fingerprint.to_string(),
            config_snapshot,
            pair_ids: Vec::new(),
            error: None,
        }
    }

    pub fn transition(&mut self, next: RunStatus) -> Result<(), AuditError> {
        if !self.status.can_transition_to(next) {
            return Err(AuditError::Configuration(format!(
                "run {}: illegal transition {} -> {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }
}

fn new_run_id(name: &str, at: &DateTime<Utc>) -> String {
    let nonce: u32 = rand::random();
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("{}-{}-{:08x}", slug, at.format("%Y%m%dT%H%M%S"), nonce)
}

/// JSON has no infinities; write them as strings so zero-variance effect
/// sizes survive a store round trip.
pub mod nonfinite {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else if v.is_nan() {
            s.serialize_str("nan")
        } else if *v > 0.0 {
            s.serialize_str("inf")
        } else {
            s.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Num(n) => Ok(n),
            Raw::Text(t) => match t.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!(
                    "invalid float literal '{}'",
                    other
                ))),
            },
        }
    }
}
