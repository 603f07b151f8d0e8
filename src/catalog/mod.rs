// Copyright 2026 Promptwall Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Detection-rule catalog.
//!
//! The catalog is an immutable, versioned table of detection patterns keyed
//! by id. Rules are data, not code: the table loads from YAML (or the
//! built-in set) and is swapped whole behind [`CatalogHandle`] - readers only
//! ever observe a complete table, never a partial update.

pub mod builtin;

use crate::errors::GatewayError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Threat taxonomy. Rules are pure data; adding a category is a one-line
/// change here plus catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    PromptInjection,
    Jailbreak,
    DataExfiltration,
    PrivilegeEscalation,
    SystemPromptLeak,
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreatCategory::PromptInjection => "prompt_injection",
            ThreatCategory::Jailbreak => "jailbreak",
            ThreatCategory::DataExfiltration => "data_exfiltration",
            ThreatCategory::PrivilegeEscalation => "privilege_escalation",
            ThreatCategory::SystemPromptLeak => "system_prompt_leak",
        };
        write!(f, "{}", s)
    }
}

/// Ordered severity scale shared by scan results and audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Non-regex heuristic matchers, tuned for encoded/obfuscated payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HeuristicKind {
    /// High Shannon entropy suggests an encoded payload.
    ShannonEntropy { threshold: f64, min_length: usize },
    /// High repeated-word ratio suggests prompt stuffing.
    RepetitionRatio { threshold: f64, min_length: usize },
    /// Unusually long input.
    LengthAnomaly { max_length: usize },
}

/// Matcher as authored in catalog data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherSpec {
    /// Case-insensitive substring, tolerant of inserted whitespace and
    /// punctuation (both sides are normalized to alphanumerics).
    Literal(String),
    /// Case-insensitive regular expression, compiled at load.
    Regex(String),
    Heuristic(HeuristicKind),
}

/// A detection rule as authored (serializable form).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub id: String,
    pub category: ThreatCategory,
    pub matcher: MatcherSpec,
    /// Severity weight in [0, 1], accumulated by the scanner's saturating sum.
    pub weight: f64,
    #[serde(default)]
    pub description: String,
}

/// Serializable catalog document (YAML on disk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSpec {
    pub version: u32,
    pub patterns: Vec<PatternSpec>,
}

#[derive(Debug)]
enum CompiledMatcher {
    Literal(String), // normalized: lowercase alphanumerics only
    Regex(Regex),
    Heuristic(HeuristicKind),
}

/// A compiled, immutable detection rule.
#[derive(Debug)]
pub struct DetectionPattern {
    pub id: String,
    pub category: ThreatCategory,
    pub weight: f64,
    pub description: String,
    matcher: CompiledMatcher,
}

/// Input prepared once per scan so each pattern probes cheap views.
pub struct PreparedInput<'a> {
    pub raw: &'a str,
    normalized: String,
}

impl<'a> PreparedInput<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            normalized: normalize(raw),
        }
    }
}

/// Lowercase and strip everything but alphanumerics. Defeats the common
/// obfuscation of sprinkling whitespace/punctuation inside a known phrase.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

impl DetectionPattern {
    /// Evidence excerpt if this pattern matches the prepared input.
    pub fn matches(&self, input: &PreparedInput<'_>) -> Option<String> {
        match &self.matcher {
            CompiledMatcher::Literal(needle) => {
                if !needle.is_empty() && input.normalized.contains(needle.as_str()) {
                    Some(truncate_chars(
                        needle,
                        crate::constants::limits::MATCH_EXCERPT_LENGTH,
                    ))
                } else {
                    None
                }
            }
            CompiledMatcher::Regex(re) => re.find(input.raw).map(|m| {
                truncate_chars(m.as_str(), crate::constants::limits::MATCH_EXCERPT_LENGTH)
            }),
            CompiledMatcher::Heuristic(kind) => {
                if heuristic_fires(kind, input.raw) {
                    Some(heuristic_name(kind).to_string())
                } else {
                    None
                }
            }
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn heuristic_name(kind: &HeuristicKind) -> &'static str {
    match kind {
        HeuristicKind::ShannonEntropy { .. } => "high_entropy",
        HeuristicKind::RepetitionRatio { .. } => "high_repetition",
        HeuristicKind::LengthAnomaly { .. } => "length_anomaly",
    }
}

fn heuristic_fires(kind: &HeuristicKind, text: &str) -> bool {
    match kind {
        HeuristicKind::ShannonEntropy {
            threshold,
            min_length,
        } => {
            let chars: Vec<char> = text.chars().collect();
            if chars.len() < *min_length {
                return false;
            }
            let mut freq = std::collections::HashMap::new();
            for c in &chars {
                *freq.entry(*c).or_insert(0usize) += 1;
            }
            let len = chars.len() as f64;
            let entropy: f64 = freq
                .values()
                .map(|&n| {
                    let p = n as f64 / len;
                    -p * p.log2()
                })
                .sum();
            entropy > *threshold
        }
        HeuristicKind::RepetitionRatio {
            threshold,
            min_length,
        } => {
            if text.chars().count() < *min_length {
                return false;
            }
            let words: Vec<String> = text.split_whitespace().map(|w| w.to_lowercase()).collect();
            if words.is_empty() {
                return false;
            }
            let unique: HashSet<&String> = words.iter().collect();
            (1.0 - unique.len() as f64 / words.len() as f64) > *threshold
        }
        HeuristicKind::LengthAnomaly { max_length } => text.chars().count() > *max_length,
    }
}

/// Immutable compiled catalog. Constructed by [`PatternCatalog::compile`],
/// shared via `Arc`, never mutated.
#[derive(Debug)]
pub struct PatternCatalog {
    pub version: u32,
    patterns: Vec<DetectionPattern>,
}

impl PatternCatalog {
    /// Validate and compile a catalog spec: ids unique, weights in [0, 1],
    /// regexes compile. Any failure rejects the whole table.
    pub fn compile(spec: CatalogSpec) -> Result<Self, GatewayError> {
        let mut seen = HashSet::new();
        let mut patterns = Vec::with_capacity(spec.patterns.len());
        for p in spec.patterns {
            if !seen.insert(p.id.clone()) {
                return Err(GatewayError::Catalog(format!("duplicate pattern id '{}'", p.id)));
            }
            if !(0.0..=1.0).contains(&p.weight) {
                return Err(GatewayError::Catalog(format!(
                    "pattern '{}': weight {} outside [0, 1]",
                    p.id, p.weight
                )));
            }
            let matcher = match p.matcher {
                MatcherSpec::Literal(s) => {
                    let normalized = normalize(&s);
                    if normalized.is_empty() {
                        return Err(GatewayError::Catalog(format!(
                            "pattern '{}': empty literal",
                            p.id
                        )));
                    }
                    CompiledMatcher::Literal(normalized)
                }
                MatcherSpec::Regex(src) => CompiledMatcher::Regex(
                    RegexBuilder::new(&src)
                        .case_insensitive(true)
                        .size_limit(1 << 20)
                        .build()
                        .map_err(|e| {
                            GatewayError::Catalog(format!("pattern '{}': {}", p.id, e))
                        })?,
                ),
                MatcherSpec::Heuristic(kind) => CompiledMatcher::Heuristic(kind),
            };
            patterns.push(DetectionPattern {
                id: p.id,
                category: p.category,
                weight: p.weight,
                description: p.description,
                matcher,
            });
        }
        Ok(Self {
            version: spec.version,
            patterns,
        })
    }

    pub fn builtin() -> Self {
        // The built-in table is validated by tests; a compile failure here is
        // a programming error in builtin.rs.
        Self::compile(builtin::builtin_catalog())
            .unwrap_or_else(|e| panic!("built-in catalog invalid: {}", e))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path)?;
        let spec: CatalogSpec = serde_yaml_ng::from_str(&raw)
            .map_err(|e| GatewayError::Catalog(format!("{}: {}", path.display(), e)))?;
        Self::compile(spec)
    }

    pub fn patterns(&self) -> &[DetectionPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Shared handle to the active catalog. Reload swaps the whole table
/// atomically; scans clone the `Arc` snapshot and are immune to concurrent
/// swaps mid-evaluation.
pub struct CatalogHandle {
    inner: RwLock<Arc<PatternCatalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: PatternCatalog) -> Self {
        Self {
            inner: RwLock::new(Arc::new(catalog)),
        }
    }

    pub fn snapshot(&self) -> Result<Arc<PatternCatalog>, GatewayError> {
        self.inner
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| GatewayError::Internal("catalog lock poisoned".to_string()))
    }

    pub fn swap(&self, catalog: PatternCatalog) -> Result<(), GatewayError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| GatewayError::Internal("catalog lock poisoned".to_string()))?;
        *guard = Arc::new(catalog);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with(patterns: Vec<PatternSpec>) -> CatalogSpec {
        CatalogSpec {
            version: 1,
            patterns,
        }
    }

    #[test]
    fn builtin_catalog_compiles() {
        let catalog = PatternCatalog::builtin();
        assert!(catalog.len() >= 30, "expected full rule set, got {}", catalog.len());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let spec = spec_with(vec![
            PatternSpec {
                id: "a".into(),
                category: ThreatCategory::Jailbreak,
                matcher: MatcherSpec::Literal("x y".into()),
                weight: 0.5,
                description: String::new(),
            },
            PatternSpec {
                id: "a".into(),
                category: ThreatCategory::Jailbreak,
                matcher: MatcherSpec::Literal("z".into()),
                weight: 0.5,
                description: String::new(),
            },
        ]);
        assert!(PatternCatalog::compile(spec).is_err());
    }

    #[test]
    fn out_of_range_weight_rejected() {
        let spec = spec_with(vec![PatternSpec {
            id: "w".into(),
            category: ThreatCategory::PromptInjection,
            matcher: MatcherSpec::Literal("x".into()),
            weight: 1.5,
            description: String::new(),
        }]);
        assert!(PatternCatalog::compile(spec).is_err());
    }

    #[test]
    fn literal_match_survives_obfuscation() {
        let spec = spec_with(vec![PatternSpec {
            id: "lit".into(),
            category: ThreatCategory::Jailbreak,
            matcher: MatcherSpec::Literal("developer mode".into()),
            weight: 0.9,
            description: String::new(),
        }]);
        let catalog = PatternCatalog::compile(spec).unwrap();
        let input = PreparedInput::new("enable d-e-v-e-l-o-p-e-r   MODE now");
        assert!(catalog.patterns()[0].matches(&input).is_some());
    }

    #[test]
    fn swap_replaces_whole_table() {
        let handle = CatalogHandle::new(PatternCatalog::builtin());
        let before = handle.snapshot().unwrap().version;
        handle
            .swap(
                PatternCatalog::compile(spec_with(vec![PatternSpec {
                    id: "only".into(),
                    category: ThreatCategory::PromptInjection,
                    matcher: MatcherSpec::Literal("zzz".into()),
                    weight: 0.1,
                    description: String::new(),
                }]))
                .unwrap(),
            )
            .unwrap();
        let after = handle.snapshot().unwrap();
        assert_eq!(after.len(), 1);
        assert_ne!(before, 0);
    }

    #[test]
    fn entropy_heuristic_fires_on_noise() {
        let kind = HeuristicKind::ShannonEntropy {
            threshold: 4.5,
            min_length: 20,
        };
        assert!(heuristic_fires(
            &kind,
            "x9$Kq2!mZ8@Wd3#Rt7&Yu1*Io5^Pa4(Ls6)Fg0-Hj"
        ));
        assert!(!heuristic_fires(&kind, "aaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
    }
}
