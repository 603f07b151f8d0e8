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

//! Compliance reporting over the durable audit log.
//!
//! Aggregates the events of a period into counts by type and severity,
//! threat-score statistics, per-agent activity, and a policy-violation
//! tally. Reads only the durable sink, so the report covers everything
//! confirmed, not just what the ring buffer still holds.

use super::sink::DurableSink;
use super::{AuditEvent, AuditEventType};
use crate::errors::GatewayError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReportPeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreatAnalysis {
    /// Threat detections plus guard blocks in the period.
    pub total_threats: usize,
    /// Mean over events carrying a positive score.
    pub avg_threat_score: f64,
    pub max_threat_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub generated_at: DateTime<Utc>,
    pub period: ReportPeriod,
    pub total_events: usize,
    pub unique_agents: usize,
    pub unique_event_types: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub threat_analysis: ThreatAnalysis,
    /// Busiest agents first, capped at [`AGENT_ACTIVITY_LIMIT`].
    pub agent_activity: Vec<AgentActivity>,
    /// Guard blocks plus permission denials.
    pub policy_violations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentActivity {
    pub agent: String,
    pub events: usize,
}

pub const AGENT_ACTIVITY_LIMIT: usize = 20;

/// Build a report over `[start, end]` from the durable log. Open bounds
/// cover everything on that side.
pub async fn generate(
    sink: &dyn DurableSink,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<ComplianceReport, GatewayError> {
    let upper = end.unwrap_or_else(Utc::now);
    let events: Vec<AuditEvent> = sink
        .fetch_older_than(upper)
        .await?
        .into_iter()
        .filter(|e| start.is_none_or(|s| e.timestamp >= s))
        .collect();

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_agent: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_threats = 0;
    let mut policy_violations = 0;
    let mut scores: Vec<f64> = Vec::new();

    for event in &events {
        *by_type.entry(event.event_type.to_string()).or_default() += 1;
        *by_severity.entry(event.severity.to_string()).or_default() += 1;
        *by_agent.entry(event.actor.clone()).or_default() += 1;
        if matches!(
            event.event_type,
            AuditEventType::ThreatDetected | AuditEventType::GuardBlock
        ) {
            total_threats += 1;
        }
        if matches!(
            event.event_type,
            AuditEventType::GuardBlock | AuditEventType::PermissionDenied
        ) {
            policy_violations += 1;
        }
        if let Some(score) = event.score {
            if score > 0.0 {
                scores.push(score);
            }
        }
    }

    let avg_threat_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    let max_threat_score = scores.iter().copied().fold(0.0, f64::max);

    let unique_agents = by_agent.len();
    let unique_event_types = by_type.len();
    let mut ranked: Vec<AgentActivity> = by_agent
        .into_iter()
        .map(|(agent, events)| AgentActivity { agent, events })
        .collect();
    ranked.sort_by(|a, b| b.events.cmp(&a.events).then(a.agent.cmp(&b.agent)));
    ranked.truncate(AGENT_ACTIVITY_LIMIT);

    Ok(ComplianceReport {
        generated_at: Utc::now(),
        period: ReportPeriod { start, end },
        total_events: events.len(),
        unique_agents,
        unique_event_types,
        by_type,
        by_severity,
        threat_analysis: ThreatAnalysis {
            total_threats,
            avg_threat_score,
            max_threat_score,
        },
        agent_activity: ranked,
        policy_violations,
    })
}
