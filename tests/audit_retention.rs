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

//! Audit pipeline and retention behavior over real JSONL storage.

use chrono::{Duration as ChronoDuration, Utc};
use promptwall::audit::retention::{RetentionManager, RetentionPolicy};
use promptwall::audit::sink::{DurableSink, JsonlArchive, JsonlSink};
use promptwall::audit::{AuditEvent, AuditEventType, AuditPipeline, QueryFilter};
use promptwall::catalog::Severity;
use std::sync::Arc;

fn event(actor: &str) -> AuditEvent {
    AuditEvent::new(
        actor,
        AuditEventType::Scan,
        Severity::Info,
        serde_json::json!({ "source": "integration" }),
    )
}

fn aged(actor: &str, days: i64) -> AuditEvent {
    let mut e = event(actor);
    e.timestamp = Utc::now() - ChronoDuration::days(days);
    e
}

#[tokio::test]
async fn ring_overflow_counts_every_dropped_event() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonlSink::new(dir.path().join("audit.jsonl")));
    let pipeline = AuditPipeline::new(100, sink.clone());

    for i in 0..150 {
        pipeline.append(event(&format!("agent-{}", i)));
    }

    assert_eq!(pipeline.buffered(), 100);
    assert_eq!(pipeline.dropped_events(), 50);

    // Flush drains the writer queue and retries anything still unconfirmed,
    // so every append reaches the durable log even though the queue is
    // bounded at the ring capacity.
    pipeline.flush().await.unwrap();
    assert_eq!(sink.count().await.unwrap(), 150);
}

#[tokio::test]
async fn ring_queries_survive_overflow() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonlSink::new(dir.path().join("audit.jsonl")));
    let pipeline = AuditPipeline::new(10, sink);

    for i in 0..25 {
        pipeline.append(event(&format!("agent-{}", i)));
    }
    let page = pipeline.query(&QueryFilter::default(), 0, 10);
    assert_eq!(page.total, 10);
    // Most recent first.
    assert_eq!(page.items[0].actor, "agent-24");
    assert_eq!(page.items[9].actor, "agent-15");
}

#[tokio::test]
async fn purge_refuses_unarchived_events() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonlSink::new(dir.path().join("audit.jsonl")));
    let archive = Arc::new(JsonlArchive::new(dir.path().join("archive.jsonl")));
    let pipeline = AuditPipeline::new(100, sink.clone());
    let mgr = RetentionManager::new(
        archive,
        pipeline,
        RetentionPolicy {
            max_age_secs: 90 * 24 * 3600,
        },
    );

    for i in 0..6 {
        sink.append(&aged(&format!("old-{}", i), 120)).await.unwrap();
    }

    let purged = mgr.purge(mgr.cutoff()).await.unwrap();
    assert_eq!(purged, 0);
    assert_eq!(sink.count().await.unwrap(), 6);
}

#[tokio::test]
async fn full_pass_archives_then_purges_only_expired() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonlSink::new(dir.path().join("audit.jsonl")));
    let archive = Arc::new(JsonlArchive::new(dir.path().join("archive.jsonl")));
    let pipeline = AuditPipeline::new(100, sink.clone());
    let mgr = RetentionManager::new(
        archive.clone(),
        pipeline,
        RetentionPolicy {
            max_age_secs: 90 * 24 * 3600,
        },
    );

    for i in 0..6 {
        sink.append(&aged(&format!("old-{}", i), 120)).await.unwrap();
    }
    for i in 0..4 {
        sink.append(&event(&format!("fresh-{}", i))).await.unwrap();
    }

    let (archived, purged) = mgr.run_pass().await.unwrap();
    assert_eq!(archived, 6);
    assert_eq!(purged, 6);

    use promptwall::audit::sink::ArchiveSink;
    assert_eq!(archive.count().await.unwrap(), 6);

    // Fresh events survive in the durable log.
    let cutoff = Utc::now() + ChronoDuration::days(1);
    let remaining = sink.fetch_older_than(cutoff).await.unwrap();
    let fresh = remaining
        .iter()
        .filter(|e| e.actor.starts_with("fresh-"))
        .count();
    assert_eq!(fresh, 4);
}

#[tokio::test]
async fn repeated_passes_are_stable() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonlSink::new(dir.path().join("audit.jsonl")));
    let archive = Arc::new(JsonlArchive::new(dir.path().join("archive.jsonl")));
    let pipeline = AuditPipeline::new(100, sink.clone());
    let mgr = RetentionManager::new(
        archive,
        pipeline,
        RetentionPolicy {
            max_age_secs: 90 * 24 * 3600,
        },
    );

    for i in 0..3 {
        sink.append(&aged(&format!("old-{}", i), 120)).await.unwrap();
    }

    let (archived, purged) = mgr.run_pass().await.unwrap();
    assert_eq!((archived, purged), (3, 3));
    let (archived, purged) = mgr.run_pass().await.unwrap();
    assert_eq!((archived, purged), (0, 0));
}
