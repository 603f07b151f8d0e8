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

//! Passphrase-gated red-team harness.
//!
//! Replays an attack corpus through the live scanner and guard, then scores
//! the gateway: an attack entry passes when it is blocked, a benign control
//! passes when it is not. Every attempt and the aggregate are audited;
//! failed authorization is itself a critical audit event.

pub mod corpus;
pub mod gate;

use crate::audit::{AuditEvent, AuditEventType, AuditPipeline};
use crate::catalog::{Severity, ThreatCategory};
use crate::errors::GatewayError;
use crate::guard::{DeniedBy, ToolCallRequest, ToolGuard};
use crate::scanner::{ScanDecision, Scanner};
use chrono::{DateTime, Utc};
use corpus::AttackCorpus;
use gate::RedTeamGate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct RedTeamAttempt {
    pub attack_id: String,
    pub category: Option<ThreatCategory>,
    pub expected_block: bool,
    pub actual_block: bool,
    pub passed: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedTeamReport {
    pub corpus_id: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    /// Attack entries that got through unblocked.
    pub bypassed: Vec<String>,
    /// Benign controls that were wrongly blocked.
    pub false_positives: Vec<String>,
    pub attempts: Vec<RedTeamAttempt>,
}

pub struct RedTeamHarness {
    gate: RedTeamGate,
    scanner: Arc<Scanner>,
    guard: Arc<ToolGuard>,
    audit: Arc<AuditPipeline>,
    /// Role used when replaying tool-vector entries through the guard. Must
    /// hold broad tool capabilities so the content stage is what gets
    /// exercised.
    replay_role: String,
    corpora: HashMap<String, AttackCorpus>,
}

impl RedTeamHarness {
    pub fn new(
        gate: RedTeamGate,
        scanner: Arc<Scanner>,
        guard: Arc<ToolGuard>,
        audit: Arc<AuditPipeline>,
    ) -> Self {
        let builtin = AttackCorpus::builtin();
        let mut corpora = HashMap::new();
        corpora.insert(builtin.id.clone(), builtin);
        Self {
            gate,
            scanner,
            guard,
            audit,
            replay_role: "orchestrator".to_string(),
            corpora,
        }
    }

    pub fn with_replay_role(mut self, role: impl Into<String>) -> Self {
        self.replay_role = role.into();
        self
    }

    pub fn register_corpus(&mut self, corpus: AttackCorpus) {
        self.corpora.insert(corpus.id.clone(), corpus);
    }

    /// Run a corpus. Authorization happens inside: rate limit first, then
    /// passphrase, then a single-use token burned for this run.
    pub async fn execute(
        &self,
        caller: &str,
        passphrase: &str,
        corpus_id: &str,
    ) -> Result<RedTeamReport, GatewayError> {
        let token = match self.gate.authorize(caller, passphrase).await {
            Ok(token) => token,
            Err(e) => {
                self.audit.append(AuditEvent::new(
                    caller,
                    AuditEventType::RedTeamAuthFail,
                    Severity::Critical,
                    serde_json::json!({
                        "corpus": corpus_id,
                        "rate_limited": matches!(e, GatewayError::RateLimited(_)),
                    }),
                ));
                return Err(e);
            }
        };
        self.gate.redeem(&token.token)?;

        let corpus = self
            .corpora
            .get(corpus_id)
            .ok_or_else(|| {
                GatewayError::InvalidInput(format!("unknown corpus '{}'", corpus_id))
            })?;

        let started_at = crate::utils::time::now();
        let mut attempts = Vec::with_capacity(corpus.entries.len());
        for entry in &corpus.entries {
            let attempt = self.replay(caller, entry).await;
            self.audit.append(
                AuditEvent::new(
                    caller,
                    AuditEventType::RedTeamAttempt,
                    if attempt.passed {
                        Severity::Info
                    } else {
                        Severity::High
                    },
                    serde_json::json!({
                        "corpus": corpus_id,
                        "attack_id": attempt.attack_id,
                        "expected_block": attempt.expected_block,
                        "actual_block": attempt.actual_block,
                        "passed": attempt.passed,
                    }),
                )
                .with_score(attempt.score),
            );
            attempts.push(attempt);
        }

        let report = summarize(corpus_id, started_at, attempts);
        self.audit.append(
            AuditEvent::new(
                caller,
                AuditEventType::RedTeamRun,
                if report.failed == 0 {
                    Severity::Info
                } else {
                    Severity::High
                },
                serde_json::json!({
                    "corpus": report.corpus_id,
                    "total": report.total,
                    "passed": report.passed,
                    "failed": report.failed,
                    "pass_rate": report.pass_rate,
                    "bypassed": report.bypassed,
                    "false_positives": report.false_positives,
                }),
            ),
        );
        info!(
            corpus = %report.corpus_id,
            total = report.total,
            failed = report.failed,
            "red-team run complete"
        );
        Ok(report)
    }

    async fn replay(&self, caller: &str, entry: &corpus::AttackEntry) -> RedTeamAttempt {
        let (actual_block, score) = match &entry.via_tool {
            Some(vector) => {
                let mut parameters = BTreeMap::new();
                parameters.insert(vector.parameter.clone(), entry.payload.clone());
                let decision = self
                    .guard
                    .check(&ToolCallRequest {
                        agent_id: format!("redteam:{}", caller),
                        tool_name: vector.tool.clone(),
                        requested_role: self.replay_role.clone(),
                        parameters,
                    })
                    .await;
                let blocked = matches!(decision.denied_by, DeniedBy::Scan | DeniedBy::Both);
                let score = decision
                    .scan
                    .as_ref()
                    .map(|s| s.aggregate_score)
                    .unwrap_or(1.0);
                (blocked, score)
            }
            None => match self.scanner.scan(&entry.payload) {
                Ok(result) => (
                    result.decision == ScanDecision::Block,
                    result.aggregate_score,
                ),
                // Scanner fault counts as a block: fail closed, and the
                // benign controls will surface it as a failure.
                Err(_) => (true, 1.0),
            },
        };
        RedTeamAttempt {
            attack_id: entry.id.clone(),
            category: entry.category,
            expected_block: entry.expected_block,
            actual_block,
            passed: actual_block == entry.expected_block,
            score,
        }
    }
}

fn summarize(
    corpus_id: &str,
    started_at: DateTime<Utc>,
    attempts: Vec<RedTeamAttempt>,
) -> RedTeamReport {
    let total = attempts.len();
    let passed = attempts.iter().filter(|a| a.passed).count();
    let bypassed = attempts
        .iter()
        .filter(|a| a.expected_block && !a.actual_block)
        .map(|a| a.attack_id.clone())
        .collect();
    let false_positives = attempts
        .iter()
        .filter(|a| !a.expected_block && a.actual_block)
        .map(|a| a.attack_id.clone())
        .collect();
    RedTeamReport {
        corpus_id: corpus_id.to_string(),
        started_at,
        total,
        passed,
        failed: total - passed,
        pass_rate: if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64
        },
        bypassed,
        false_positives,
        attempts,
    }
}
