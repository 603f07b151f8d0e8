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

//! Audit event pipeline.
//!
//! An explicitly constructed, explicitly owned pipeline: a bounded in-memory
//! ring buffer is the fast read path for recent events, and a writer task
//! asynchronously mirrors every event to the durable sink. `append` never
//! blocks the caller: ring insertion holds a short lock and the writer queue
//! is a bounded channel fed with `try_send`.
//!
//! Capacity eviction drops the oldest entry, preferring one whose durable
//! write has been confirmed; every eviction increments the dropped-events
//! counter. On sink failure events stay buffered (degraded, not lost) until
//! capacity forces a counted drop; the writer periodically retries every
//! unpersisted entry so a recovered sink catches up on its own.

pub mod report;
pub mod retention;
pub mod sink;

use crate::catalog::Severity;
use crate::constants::limits::MAX_RAW_PAYLOAD_BYTES;
use crate::errors::GatewayError;
use crate::utils::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sink::DurableSink;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Scan,
    ThreatDetected,
    GuardCheck,
    GuardBlock,
    PermissionDenied,
    RedTeamAttempt,
    RedTeamRun,
    RedTeamAuthFail,
    RetentionPass,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditEventType::Scan => "scan",
            AuditEventType::ThreatDetected => "threat_detected",
            AuditEventType::GuardCheck => "guard_check",
            AuditEventType::GuardBlock => "guard_block",
            AuditEventType::PermissionDenied => "permission_denied",
            AuditEventType::RedTeamAttempt => "red_team_attempt",
            AuditEventType::RedTeamRun => "red_team_run",
            AuditEventType::RedTeamAuthFail => "red_team_auth_fail",
            AuditEventType::RetentionPass => "retention_pass",
        };
        write!(f, "{}", s)
    }
}

/// Write-once security event. Lifecycle state (archived) lives in retention
/// metadata, never in the event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub event_type: AuditEventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// SHA-256 over the canonical payload JSON.
    pub payload_digest: String,
    /// Size-capped copy of the payload; the digest always covers the
    /// uncapped form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
}

impl AuditEvent {
    pub fn new(
        actor: impl Into<String>,
        event_type: AuditEventType,
        severity: Severity,
        payload: serde_json::Value,
    ) -> Self {
        let canonical = payload.to_string();
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
        let raw_payload = if canonical.len() > MAX_RAW_PAYLOAD_BYTES {
            let mut end = MAX_RAW_PAYLOAD_BYTES;
            while !canonical.is_char_boundary(end) {
                end -= 1;
            }
            Some(canonical[..end].to_string())
        } else {
            Some(canonical)
        };
        Self {
            id: Uuid::new_v4(),
            timestamp: time::now(),
            actor: actor.into(),
            event_type,
            severity,
            tool_name: None,
            score: None,
            payload_digest: digest,
            raw_payload,
        }
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Filters for `query`. All present filters must match.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub event_type: Option<AuditEventType>,
    pub severity: Option<Severity>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl QueryFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(t) = self.event_type {
            if event.event_type != t {
                return false;
            }
        }
        if let Some(s) = self.severity {
            if event.severity != s {
                return false;
            }
        }
        if let Some(ref a) = self.actor {
            if &event.actor != a {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp >= until {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

struct RingEntry {
    event: AuditEvent,
    persisted: bool,
}

struct Shared {
    ring: RwLock<VecDeque<RingEntry>>,
    capacity: usize,
    dropped: AtomicU64,
    sink: Arc<dyn DurableSink>,
}

enum WriterMsg {
    Event(AuditEvent),
    Flush(oneshot::Sender<()>),
}

pub struct AuditPipeline {
    shared: Arc<Shared>,
    tx: mpsc::Sender<WriterMsg>,
}

impl AuditPipeline {
    /// Construct the pipeline and spawn its writer task. Must run inside a
    /// tokio runtime. `capacity` bounds both the ring buffer and the writer
    /// queue.
    pub fn new(capacity: usize, sink: Arc<dyn DurableSink>) -> Arc<Self> {
        let shared = Arc::new(Shared {
            ring: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            sink,
        });
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(writer_loop(Arc::clone(&shared), rx));
        Arc::new(Self { shared, tx })
    }

    /// Append an event. Non-blocking: the ring insert holds a short lock and
    /// the durable mirror goes through `try_send`. If the writer queue is
    /// full the event stays buffered unpersisted until the writer catches up
    /// or capacity evicts it (counted).
    pub fn append(&self, event: AuditEvent) {
        info!(
            target: "audit",
            event_id = %event.id,
            event_type = %event.event_type,
            severity = %event.severity,
            actor = %event.actor,
            digest = %event.payload_digest,
            "audit event"
        );

        {
            let mut ring = match self.shared.ring.write() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            if ring.len() >= self.shared.capacity {
                // Prefer dropping the oldest entry whose durable write is
                // confirmed; an unpersisted entry is only sacrificed when
                // nothing persisted remains.
                let idx = ring
                    .iter()
                    .position(|e| e.persisted)
                    .unwrap_or(0);
                ring.remove(idx);
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
            ring.push_back(RingEntry {
                event: event.clone(),
                persisted: false,
            });
        }

        if self.tx.try_send(WriterMsg::Event(event)).is_err() {
            warn!("audit writer queue full; event buffered unpersisted");
        }
    }

    /// Paginated query over the ring buffer (most recent first). This is the
    /// fast read path for recent events; historical reads go through the
    /// durable sink.
    pub fn query(&self, filter: &QueryFilter, page: usize, page_size: usize) -> Page<AuditEvent> {
        let page_size = page_size.max(1);
        let ring = match self.shared.ring.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let matching: Vec<&RingEntry> = ring
            .iter()
            .rev()
            .filter(|e| filter.matches(&e.event))
            .collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .map(|e| e.event.clone())
            .collect();
        Page {
            items,
            total,
            page,
            page_size,
        }
    }

    /// Count of events evicted from the ring by capacity pressure.
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn buffered(&self) -> usize {
        match self.shared.ring.read() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn sink(&self) -> Arc<dyn DurableSink> {
        Arc::clone(&self.shared.sink)
    }

    /// Drop purged events from the ring so queries stop serving them.
    pub(crate) fn evict_ids(&self, ids: &std::collections::HashSet<Uuid>) {
        let mut ring = match self.shared.ring.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        ring.retain(|e| !ids.contains(&e.event.id));
    }

    /// Drain the writer queue and retry every buffered event still awaiting
    /// durable confirmation. Part of the documented shutdown sequence.
    pub async fn flush(&self) -> Result<(), GatewayError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterMsg::Flush(ack_tx))
            .await
            .map_err(|_| GatewayError::Internal("audit writer stopped".to_string()))?;
        ack_rx
            .await
            .map_err(|_| GatewayError::Internal("audit writer stopped".to_string()))
    }
}

const SWEEP_INTERVAL_SECS: u64 = 5;

async fn writer_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<WriterMsg>) {
    // Failed writes are retried by the periodic sweep, which also picks up
    // events that never made it into the queue (try_send overflow).
    let mut sweep = tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(WriterMsg::Event(event)) => {
                    if let Err(e) = persist_one(&shared, &event).await {
                        warn!("durable audit sink unavailable: {}", e);
                    }
                }
                Some(WriterMsg::Flush(ack)) => {
                    sweep_unpersisted(&shared).await;
                    let _ = ack.send(());
                }
                None => break,
            },
            _ = sweep.tick() => sweep_unpersisted(&shared).await,
        }
    }
}

async fn persist_one(shared: &Shared, event: &AuditEvent) -> Result<(), GatewayError> {
    shared.sink.append(event).await?;
    let mut ring = match shared.ring.write() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(entry) = ring.iter_mut().find(|e| e.event.id == event.id) {
        entry.persisted = true;
    }
    Ok(())
}

/// Retry every buffered event whose durable write has not been confirmed.
/// Stops at the first failure; the sink is evidently still down.
async fn sweep_unpersisted(shared: &Shared) {
    let pending: Vec<AuditEvent> = {
        let ring = match shared.ring.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        ring.iter()
            .filter(|e| !e.persisted)
            .map(|e| e.event.clone())
            .collect()
    };
    for event in pending {
        if let Err(e) = persist_one(shared, &event).await {
            warn!("audit sweep halted, sink still unavailable: {}", e);
            break;
        }
    }
}
