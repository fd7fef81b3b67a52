use crate::errors::AuditError;
use crate::model::{GroupLabel, MatchedPair, Probe};
use crate::redaction::PiiGuard;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// A probe template: one controlled variable substituted per group, every
/// other placeholder drawn once per pair and shared by all of its probes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeTemplate {
    pub id: String,
    pub text: String,
    /// Placeholder whose value differs between groups.
    pub variable: String,
    /// Synthetic values of the controlled variable, keyed by group.
    pub variants: BTreeMap<GroupLabel, Vec<String>>,
    /// Synthetic values for the shared placeholders.
    #[serde(default)]
    pub slots: BTreeMap<String, Vec<String>>,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static placeholder regex"))
}

impl ProbeTemplate {
    pub fn placeholders(&self) -> BTreeSet<String> {
        placeholder_re()
            .captures_iter(&self.text)
            .map(|c| c[1].to_string())
            .collect()
    }

    pub fn expected_groups(&self) -> Vec<GroupLabel> {
        self.variants.keys().cloned().collect()
    }

    pub fn validate(&self, groups: &[GroupLabel]) -> Result<(), AuditError> {
        check_group_set(&self.expected_groups(), groups)?;

        let placeholders = self.placeholders();
        if !placeholders.contains(&self.variable) {
            return Err(AuditError::Configuration(format!(
                "template '{}' never uses its controlled variable {{{}}}",
                self.id, self.variable
            )));
        }
        if self.slots.contains_key(&self.variable) {
            return Err(AuditError::Configuration(format!(
                "template '{}': '{}' is both the controlled variable and a shared slot",
                self.id, self.variable
            )));
        }
        for p in &placeholders {
            if p != &self.variable && !self.slots.contains_key(p) {
                return Err(AuditError::Configuration(format!(
                    "template '{}': placeholder {{{}}} has no slot values",
                    self.id, p
                )));
            }
        }
        for (group, values) in &self.variants {
            if values.is_empty() {
                return Err(AuditError::Configuration(format!(
                    "template '{}': group '{}' has no variant values",
                    self.id, group
                )));
            }
        }
        for (slot, values) in &self.slots {
            if values.is_empty() {
                return Err(AuditError::Configuration(format!(
                    "template '{}': slot '{}' has no values",
                    self.id, slot
                )));
            }
        }
        Ok(())
    }

    fn render(&self, fields: &BTreeMap<String, String>) -> String {
        placeholder_re()
            .replace_all(&self.text, |c: &regex::Captures| {
                fields.get(&c[1]).cloned().unwrap_or_else(|| c[0].to_string())
            })
            .into_owned()
    }
}

fn check_group_set(expected: &[GroupLabel], actual: &[GroupLabel]) -> Result<(), AuditError> {
    let e: BTreeSet<&GroupLabel> = expected.iter().collect();
    let a: BTreeSet<&GroupLabel> = actual.iter().collect();
    if e != a || a.len() != actual.len() {
        return Err(AuditError::InvalidGroupSet {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

pub struct ProbeGenerator {
    template: ProbeTemplate,
    guard: PiiGuard,
    rng: StdRng,
    next_index: usize,
}

impl ProbeGenerator {
    pub fn new(template: ProbeTemplate, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            template,
            guard: PiiGuard::default(),
            rng,
            next_index: 0,
        }
    }

    /// Produces `count` matched pairs, one probe per group in `groups` order.
    ///
    /// Nothing is returned unless every probe passes the outbound PII scan.
    pub fn generate(
        &mut self,
        count: usize,
        groups: &[GroupLabel],
    ) -> Result<Vec<MatchedPair>, AuditError> {
        if count == 0 {
            return Err(AuditError::Configuration("pair count must be positive".into()));
        }
        self.template.validate(groups)?;

        let mut pairs = Vec::with_capacity(count);
        for _ in 0..count {
            let pair = self.next_pair(groups)?;
            pairs.push(pair);
        }
        tracing::debug!(
            event = "fairprobe.generator.generated",
            template = %self.template.id,
            pairs = pairs.len(),
        );
        Ok(pairs)
    }

    fn next_pair(&mut self, groups: &[GroupLabel]) -> Result<MatchedPair, AuditError> {
        let pair_id = format!("pair-{:04}", self.next_index);
        self.next_index += 1;

        let mut shared = BTreeMap::new();
        for (slot, values) in &self.template.slots {
            if let Some(v) = values.choose(&mut self.rng) {
                shared.insert(slot.clone(), v.clone());
            }
        }

        let created_at = chrono::Utc::now();
        let mut probes = Vec::with_capacity(groups.len());
        for group in groups {
            let variant = self
                .template
                .variants
                .get(group)
                .and_then(|vs| vs.choose(&mut self.rng))
                .cloned()
                .ok_or_else(|| AuditError::InvalidGroupSet {
                    expected: self.template.expected_groups(),
                    actual: groups.to_vec(),
                })?;

            let mut fields = shared.clone();
            fields.insert(self.template.variable.clone(), variant);
            let content = self.template.render(&fields);
            let probe_id = format!("{}:{}", pair_id, group);

            if let Some(finding) = self.guard.scan(&content).into_iter().next() {
                tracing::error!(
                    event = "fairprobe.generator.pii_detected",
                    probe_id = %probe_id,
                    kind = %finding.kind,
                );
                return Err(AuditError::SyntheticPiiDetected {
                    probe_id,
                    kind: finding.kind.to_string(),
                });
            }

            probes.push(Probe {
                id: probe_id,
                pair_id: pair_id.clone(),
                group: group.clone(),
                content,
                fields,
                created_at,
            });
        }

        Ok(MatchedPair {
            id: pair_id,
            probes,
        })
    }
}
