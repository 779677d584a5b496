//! Heuristic (rule-based) analysis.
//!
//! All rule patterns are compiled into one ASCII case-insensitive
//! Aho-Corasick automaton. A scan is a single linear pass over the artifact;
//! each rule reports its first hit only and findings are returned in order of
//! their first match offset. Composite rules are evaluated over the pattern
//! rules that fired and report the hit that completed the combination.

pub mod apis;
pub mod rules;
pub mod sniff;

pub use rules::{CompositeRule, Rule, RuleSet, Severity};

use crate::artifact::RawArtifact;
use crate::config::HeuristicsConfig;
use crate::error::{Result, ScanError};
use crate::features::Structure;
use aho_corasick::{AhoCorasick, MatchKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One triggered rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicFinding {
    pub rule_id: String,
    pub description: String,
    pub severity: Severity,
    /// Offset of the first match.
    pub offset: usize,
    /// Bytes of the first match.
    #[serde(with = "hex_bytes")]
    pub matched: Vec<u8>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

/// Additive severity sum divided by `saturation`, clipped to [0,1].
pub fn heuristic_score(findings: &[HeuristicFinding], saturation: f32) -> f32 {
    if saturation <= 0.0 {
        return 0.0;
    }
    let total: u32 = findings.iter().map(|f| f.severity.weight()).sum();
    (total as f32 / saturation).clamp(0.0, 1.0)
}

/// Compiled rule set.
#[derive(Debug, Clone)]
pub struct HeuristicAnalyzer {
    rules: RuleSet,
    matcher: AhoCorasick,
    /// Rule index of every compiled pattern.
    pattern_rule: Vec<usize>,
    detect_type_mismatch: bool,
    severity_saturation: f32,
}

impl HeuristicAnalyzer {
    /// Compile a rule set.
    pub fn new(rules: RuleSet, config: &HeuristicsConfig) -> Result<Self> {
        rules.validate()?;
        let mut patterns = Vec::new();
        let mut pattern_rule = Vec::new();
        for (idx, rule) in rules.rules.iter().enumerate() {
            for p in &rule.patterns {
                patterns.push(p.as_bytes());
                pattern_rule.push(idx);
            }
        }
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .map_err(|e| ScanError::InvalidConfig(format!("heuristic patterns: {e}")))?;
        debug!(rules = rules.len(), patterns = patterns.len(), "Compiled heuristic rules");
        Ok(Self {
            rules,
            matcher,
            pattern_rule,
            detect_type_mismatch: config.detect_type_mismatch,
            severity_saturation: config.severity_saturation,
        })
    }

    /// Build from configuration: built-in rules and/or a JSON pattern file.
    pub fn from_config(config: &HeuristicsConfig) -> Result<Self> {
        let mut rules = if config.include_builtin || config.patterns_path.is_none() {
            RuleSet::builtin()
        } else {
            RuleSet::default()
        };
        if let Some(path) = &config.patterns_path {
            rules.extend(RuleSet::from_file(path)?);
        }
        info!(rules = rules.len(), "Heuristic analyzer ready");
        Self::new(rules, config)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Run every applicable rule over the artifact.
    pub fn analyze(&self, artifact: &RawArtifact, structure: &Structure) -> Vec<HeuristicFinding> {
        let data = artifact.bytes();
        let format = structure.format();
        let applicable: Vec<bool> = self
            .rules
            .rules
            .iter()
            .map(|r| r.applies_to(format))
            .collect();
        let mut first_hit: Vec<Option<(usize, usize)>> = vec![None; self.rules.rules.len()];

        for m in self.matcher.find_overlapping_iter(data) {
            let rule = self.pattern_rule[m.pattern().as_usize()];
            if !applicable[rule] {
                continue;
            }
            match first_hit[rule] {
                None => first_hit[rule] = Some((m.start(), m.end())),
                // overlapping matches arrive by end offset; keep the earliest start
                Some((start, _)) if m.start() < start => {
                    first_hit[rule] = Some((m.start(), m.end()));
                }
                Some(_) => {}
            }
        }

        let mut findings: Vec<HeuristicFinding> = Vec::new();
        if self.detect_type_mismatch {
            findings.extend(sniff::detect_type_mismatch(artifact));
        }
        findings.extend(first_hit.iter().enumerate().filter_map(|(idx, hit)| {
            let (start, end) = (*hit)?;
            let rule = &self.rules.rules[idx];
            Some(HeuristicFinding {
                rule_id: rule.id.clone(),
                description: rule.description.clone(),
                severity: rule.severity,
                offset: start,
                matched: data[start..end].to_vec(),
            })
        }));
        findings.extend(self.composite_findings(data, &first_hit));
        findings.sort_by_key(|f| f.offset);
        debug!(findings = findings.len(), "Heuristic analysis complete");
        findings
    }

    fn composite_findings(
        &self,
        data: &[u8],
        first_hit: &[Option<(usize, usize)>],
    ) -> Vec<HeuristicFinding> {
        let hit = |id: &str| {
            self.rules
                .rules
                .iter()
                .position(|r| r.id == id)
                .and_then(|idx| first_hit[idx])
        };
        self.rules
            .composites
            .iter()
            .filter(|c| c.matches(|id| hit(id).is_some()))
            .filter_map(|c| {
                let (start, end) = c.references().filter_map(|id| hit(id)).max()?;
                Some(HeuristicFinding {
                    rule_id: c.id.clone(),
                    description: c.description.clone(),
                    severity: c.severity,
                    offset: start,
                    matched: data[start..end].to_vec(),
                })
            })
            .collect()
    }

    /// Normalized severity score of a set of findings.
    pub fn score(&self, findings: &[HeuristicFinding]) -> f32 {
        heuristic_score(findings, self.severity_saturation)
    }
}
