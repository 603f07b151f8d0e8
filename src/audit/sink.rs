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

//! Durable storage behind the audit pipeline.
//!
//! Two seams: [`DurableSink`] holds the authoritative event log, and
//! [`ArchiveSink`] receives cold copies during retention passes. The default
//! implementations are append-only JSONL files; the in-memory variants back
//! tests and ephemeral deployments.

use super::AuditEvent;
use crate::errors::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait DurableSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), GatewayError>;
    async fn fetch_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>, GatewayError>;
    /// Delete by id, returning how many events were actually removed.
    async fn delete(&self, ids: &[Uuid]) -> Result<usize, GatewayError>;
    async fn count(&self) -> Result<usize, GatewayError>;
}

#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Store a batch of cold copies. Must be durable before it returns Ok.
    async fn store(&self, events: &[AuditEvent]) -> Result<(), GatewayError>;
    /// Ids of every event already archived. Retention seeds its
    /// confirmed-archive set from this, so copies survive a restart.
    async fn ids(&self) -> Result<Vec<Uuid>, GatewayError>;
    async fn count(&self) -> Result<usize, GatewayError>;
}

/// Append-only JSONL event log. One JSON object per line; deletion rewrites
/// the file through a temp-and-rename so a crash never leaves a torn log.
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<AuditEvent>, GatewayError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => parse_jsonl(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_jsonl(raw: &str) -> Result<Vec<AuditEvent>, GatewayError> {
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(GatewayError::from))
        .collect()
}

async fn append_lines(path: &Path, events: &[AuditEvent]) -> Result<(), GatewayError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut buf = String::new();
    for event in events {
        buf.push_str(&serde_json::to_string(event)?);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl DurableSink for JsonlSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), GatewayError> {
        let _guard = self.lock.lock().await;
        append_lines(&self.path, std::slice::from_ref(event)).await
    }

    async fn fetch_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>, GatewayError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.timestamp < cutoff)
            .collect())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<usize, GatewayError> {
        let _guard = self.lock.lock().await;
        let doomed: HashSet<&Uuid> = ids.iter().collect();
        let events = self.read_all().await?;
        let before = events.len();
        let kept: Vec<AuditEvent> = events
            .into_iter()
            .filter(|e| !doomed.contains(&e.id))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            let mut buf = String::new();
            for event in &kept {
                buf.push_str(&serde_json::to_string(event)?);
                buf.push('\n');
            }
            let tmp = self.path.with_extension("jsonl.tmp");
            fs::write(&tmp, buf).await?;
            fs::rename(&tmp, &self.path).await?;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, GatewayError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.len())
    }
}

/// JSONL archive file. Strictly append-only; nothing ever deletes from it.
pub struct JsonlArchive {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ArchiveSink for JsonlArchive {
    async fn store(&self, events: &[AuditEvent]) -> Result<(), GatewayError> {
        let _guard = self.lock.lock().await;
        append_lines(&self.path, events).await
    }

    async fn ids(&self) -> Result<Vec<Uuid>, GatewayError> {
        let _guard = self.lock.lock().await;
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(parse_jsonl(&raw)?.into_iter().map(|e| e.id).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn count(&self) -> Result<usize, GatewayError> {
        let _guard = self.lock.lock().await;
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(raw.lines().filter(|l| !l.trim().is_empty()).count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory sink for tests and ephemeral runs.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl DurableSink for MemorySink {
    async fn append(&self, event: &AuditEvent) -> Result<(), GatewayError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn fetch_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>, GatewayError> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| e.timestamp < cutoff)
            .cloned()
            .collect())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<usize, GatewayError> {
        let doomed: HashSet<&Uuid> = ids.iter().collect();
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|e| !doomed.contains(&e.id));
        Ok(before - events.len())
    }

    async fn count(&self) -> Result<usize, GatewayError> {
        Ok(self.events.lock().await.len())
    }
}

#[derive(Default)]
pub struct MemoryArchive {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryArchive {
    pub async fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl ArchiveSink for MemoryArchive {
    async fn store(&self, events: &[AuditEvent]) -> Result<(), GatewayError> {
        self.events.lock().await.extend_from_slice(events);
        Ok(())
    }

    async fn ids(&self) -> Result<Vec<Uuid>, GatewayError> {
        Ok(self.events.lock().await.iter().map(|e| e.id).collect())
    }

    async fn count(&self) -> Result<usize, GatewayError> {
        Ok(self.events.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEventType;
    use crate::catalog::Severity;

    fn event() -> AuditEvent {
        AuditEvent::new(
            "tester",
            AuditEventType::Scan,
            Severity::Info,
            serde_json::json!({ "n": 1 }),
        )
    }

    #[tokio::test]
    async fn jsonl_sink_round_trips_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("audit.jsonl"));

        let a = event();
        let b = event();
        sink.append(&a).await.unwrap();
        sink.append(&b).await.unwrap();
        assert_eq!(sink.count().await.unwrap(), 2);

        let removed = sink.delete(&[a.id]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(sink.count().await.unwrap(), 1);

        // Deleting an unknown id removes nothing.
        let removed = sink.delete(&[Uuid::new_v4()]).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn jsonl_sink_fetch_older_than_filters_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("audit.jsonl"));

        let mut old = event();
        old.timestamp = Utc::now() - chrono::Duration::days(10);
        let fresh = event();
        sink.append(&old).await.unwrap();
        sink.append(&fresh).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(1);
        let expired = sink.fetch_older_than(cutoff).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);
    }

    #[tokio::test]
    async fn archive_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let archive = JsonlArchive::new(dir.path().join("archive.jsonl"));
        archive.store(&[event(), event()]).await.unwrap();
        archive.store(&[event()]).await.unwrap();
        assert_eq!(archive.count().await.unwrap(), 3);
    }
}
