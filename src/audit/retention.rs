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

//! Retention: archive-before-purge over the durable event log.
//!
//! The ordering invariant is absolute: an event is purge-eligible only once
//! its archive copy has been durably stored. Passes are single-flight, and
//! each pass captures its cutoff once so events aging past the threshold
//! mid-pass wait for the next one.

use super::sink::{ArchiveSink, DurableSink};
use super::{AuditEvent, AuditEventType, AuditPipeline};
use crate::catalog::Severity;
use crate::errors::GatewayError;
use crate::utils::time;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetentionStats {
    /// Events currently in the durable log.
    pub total: usize,
    /// Events past the retention age.
    pub expired: usize,
    /// Events with a confirmed archive copy.
    pub archived: usize,
    /// Expired events whose archive copy is confirmed.
    pub purge_eligible: usize,
    /// Ring-buffer evictions since startup.
    pub dropped_events: u64,
    /// Events currently in the ring buffer.
    pub buffered: usize,
}

pub struct RetentionManager {
    sink: Arc<dyn DurableSink>,
    archive: Arc<dyn ArchiveSink>,
    pipeline: Arc<AuditPipeline>,
    policy: RetentionPolicy,
    /// Ids whose archive copy has been durably stored.
    archived: std::sync::Mutex<HashSet<Uuid>>,
    /// Whether `archived` has been seeded from the archive itself.
    hydrated: AtomicBool,
    /// Single-flight guard over archive and purge passes.
    inflight: Mutex<()>,
}

impl RetentionManager {
    pub fn new(
        archive: Arc<dyn ArchiveSink>,
        pipeline: Arc<AuditPipeline>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            sink: pipeline.sink(),
            archive,
            pipeline,
            policy,
            archived: std::sync::Mutex::new(HashSet::new()),
            hydrated: AtomicBool::new(false),
            inflight: Mutex::new(()),
        }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        time::cutoff_before(self.policy.max_age_secs)
    }

    pub async fn stats(&self) -> Result<RetentionStats, GatewayError> {
        self.ensure_hydrated().await?;
        let total = self.sink.count().await?;
        let expired = self.sink.fetch_older_than(self.cutoff()).await?;
        let (archived_count, purge_eligible) = {
            let archived = lock_archived(&self.archived);
            let eligible = expired.iter().filter(|e| archived.contains(&e.id)).count();
            (archived.len(), eligible)
        };
        Ok(RetentionStats {
            total,
            expired: expired.len(),
            archived: archived_count,
            purge_eligible,
            dropped_events: self.pipeline.dropped_events(),
            buffered: self.pipeline.buffered(),
        })
    }

    /// Copy events older than `cutoff` to the archive. Returns how many new
    /// copies were stored; already-archived events are skipped.
    pub async fn archive(&self, cutoff: DateTime<Utc>) -> Result<usize, GatewayError> {
        let _guard = self.inflight.lock().await;
        self.archive_locked(cutoff).await
    }

    /// Delete events older than `cutoff` whose archive copy is confirmed.
    /// Returns how many events were actually removed from the durable log.
    pub async fn purge(&self, cutoff: DateTime<Utc>) -> Result<usize, GatewayError> {
        let _guard = self.inflight.lock().await;
        self.purge_locked(cutoff).await
    }

    /// One full pass: archive then purge, against a cutoff captured once at
    /// the start. Returns (archived, purged).
    pub async fn run_pass(&self) -> Result<(usize, usize), GatewayError> {
        let _guard = self.inflight.lock().await;
        let cutoff = self.cutoff();
        let archived = self.archive_locked(cutoff).await?;
        let purged = self.purge_locked(cutoff).await?;

        self.pipeline.append(
            AuditEvent::new(
                "retention",
                AuditEventType::RetentionPass,
                Severity::Info,
                serde_json::json!({
                    "cutoff": cutoff,
                    "archived": archived,
                    "purged": purged,
                }),
            ),
        );
        info!(archived, purged, %cutoff, "retention pass complete");
        Ok((archived, purged))
    }

    /// Seed the confirmed-archive set from the archive itself, once per
    /// process. Without this a restart would forget which copies exist and
    /// re-archive every expired event.
    async fn ensure_hydrated(&self) -> Result<(), GatewayError> {
        if self.hydrated.load(Ordering::Acquire) {
            return Ok(());
        }
        let ids = self.archive.ids().await?;
        let mut archived = lock_archived(&self.archived);
        archived.extend(ids);
        drop(archived);
        self.hydrated.store(true, Ordering::Release);
        Ok(())
    }

    async fn archive_locked(&self, cutoff: DateTime<Utc>) -> Result<usize, GatewayError> {
        self.ensure_hydrated().await?;
        let expired = self.sink.fetch_older_than(cutoff).await?;
        let pending: Vec<AuditEvent> = {
            let archived = lock_archived(&self.archived);
            expired
                .into_iter()
                .filter(|e| !archived.contains(&e.id))
                .collect()
        };
        if pending.is_empty() {
            return Ok(0);
        }
        // Marking happens only after store returns: a failed archive write
        // leaves every event purge-ineligible.
        self.archive.store(&pending).await?;
        let mut archived = lock_archived(&self.archived);
        for event in &pending {
            archived.insert(event.id);
        }
        Ok(pending.len())
    }

    async fn purge_locked(&self, cutoff: DateTime<Utc>) -> Result<usize, GatewayError> {
        self.ensure_hydrated().await?;
        let expired = self.sink.fetch_older_than(cutoff).await?;
        let doomed: Vec<Uuid> = {
            let archived = lock_archived(&self.archived);
            expired
                .iter()
                .filter(|e| archived.contains(&e.id))
                .map(|e| e.id)
                .collect()
        };
        if doomed.is_empty() {
            return Ok(0);
        }
        let removed = self.sink.delete(&doomed).await?;
        let doomed_set: HashSet<Uuid> = doomed.into_iter().collect();
        self.pipeline.evict_ids(&doomed_set);
        // Purged ids stay in the confirmed-archive set; the archive itself is
        // append-only and re-hydration would bring them back anyway.
        Ok(removed)
    }

    /// Periodic retention loop; runs until the shutdown flag flips.
    pub async fn run_loop(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_pass().await {
                        warn!("retention pass failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

fn lock_archived(
    archived: &std::sync::Mutex<HashSet<Uuid>>,
) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
    match archived.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::sink::{MemoryArchive, MemorySink};
    use super::*;
    use chrono::Duration as ChronoDuration;

    async fn seeded(
        old: usize,
        fresh: usize,
    ) -> (Arc<AuditPipeline>, Arc<MemorySink>, Arc<MemoryArchive>) {
        let sink = Arc::new(MemorySink::default());
        let pipeline = AuditPipeline::new(100, sink.clone());
        for i in 0..old {
            let mut event = AuditEvent::new(
                format!("agent-{}", i),
                AuditEventType::Scan,
                Severity::Info,
                serde_json::json!({}),
            );
            event.timestamp = time::now() - ChronoDuration::days(120);
            sink.append(&event).await.unwrap();
        }
        for i in 0..fresh {
            let event = AuditEvent::new(
                format!("fresh-{}", i),
                AuditEventType::Scan,
                Severity::Info,
                serde_json::json!({}),
            );
            sink.append(&event).await.unwrap();
        }
        (pipeline, sink, Arc::new(MemoryArchive::default()))
    }

    fn manager(
        pipeline: Arc<AuditPipeline>,
        archive: Arc<MemoryArchive>,
    ) -> RetentionManager {
        RetentionManager::new(
            archive,
            pipeline,
            RetentionPolicy {
                max_age_secs: 90 * 24 * 3600,
            },
        )
    }

    #[tokio::test]
    async fn purge_without_archive_removes_nothing() {
        let (pipeline, sink, archive) = seeded(6, 4).await;
        let mgr = manager(pipeline, archive);
        let purged = mgr.purge(mgr.cutoff()).await.unwrap();
        assert_eq!(purged, 0);
        assert_eq!(sink.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn archive_then_purge_removes_only_expired() {
        let (pipeline, sink, archive) = seeded(6, 4).await;
        let mgr = manager(pipeline, archive.clone());
        let cutoff = mgr.cutoff();

        let archived = mgr.archive(cutoff).await.unwrap();
        assert_eq!(archived, 6);
        assert_eq!(archive.count().await.unwrap(), 6);

        let purged = mgr.purge(cutoff).await.unwrap();
        assert_eq!(purged, 6);
        assert_eq!(sink.count().await.unwrap(), 4);

        // A second purge against the same cutoff finds nothing.
        let purged = mgr.purge(cutoff).await.unwrap();
        assert_eq!(purged, 0);
    }

    #[tokio::test]
    async fn archive_is_idempotent() {
        let (pipeline, _sink, archive) = seeded(3, 0).await;
        let mgr = manager(pipeline, archive.clone());
        let cutoff = mgr.cutoff();
        assert_eq!(mgr.archive(cutoff).await.unwrap(), 3);
        assert_eq!(mgr.archive(cutoff).await.unwrap(), 0);
        assert_eq!(archive.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn run_pass_reports_counts_and_stats_track() {
        let (pipeline, sink, archive) = seeded(5, 2).await;
        let mgr = manager(pipeline, archive);

        let before = mgr.stats().await.unwrap();
        assert_eq!(before.total, 7);
        assert_eq!(before.expired, 5);
        assert_eq!(before.archived, 0);
        assert_eq!(before.purge_eligible, 0);

        let (archived, purged) = mgr.run_pass().await.unwrap();
        assert_eq!(archived, 5);
        assert_eq!(purged, 5);

        // 2 fresh survivors plus the retention_pass event itself.
        let after = mgr.stats().await.unwrap();
        assert_eq!(after.expired, 0);
        assert_eq!(after.archived, 5);
        assert!(sink.count().await.unwrap() >= 2);
    }

    #[tokio::test]
    async fn restart_recovers_archive_confirmations() {
        let (pipeline, sink, archive) = seeded(4, 0).await;
        let mgr = manager(pipeline.clone(), archive.clone());
        assert_eq!(mgr.archive(mgr.cutoff()).await.unwrap(), 4);
        drop(mgr);

        // A fresh manager over the same stores seeds its confirmed-archive
        // set from the archive: nothing is copied twice, and purge still
        // recognizes the existing copies.
        let mgr = manager(pipeline, archive.clone());
        assert_eq!(mgr.archive(mgr.cutoff()).await.unwrap(), 0);
        assert_eq!(archive.count().await.unwrap(), 4);
        assert_eq!(mgr.stats().await.unwrap().archived, 4);
        assert_eq!(mgr.purge(mgr.cutoff()).await.unwrap(), 4);
        assert_eq!(sink.count().await.unwrap(), 0);
    }
}
