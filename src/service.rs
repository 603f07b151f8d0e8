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

//! Gateway assembly.
//!
//! [`SecurityGateway`] wires catalog, scanner, guard, audit pipeline,
//! retention, and the red-team harness from one [`Config`] and exposes the
//! operations callers actually use. Construction is explicit and fallible;
//! nothing here is a global.

use crate::audit::report::{self, ComplianceReport};
use crate::audit::retention::{RetentionManager, RetentionPolicy, RetentionStats};
use crate::audit::sink::{
    ArchiveSink, DurableSink, JsonlArchive, JsonlSink, MemoryArchive, MemorySink,
};
use crate::audit::{AuditEvent, AuditEventType, AuditPipeline, Page, QueryFilter};
use crate::catalog::{CatalogHandle, PatternCatalog};
use crate::config::Config;
use crate::errors::GatewayError;
use crate::guard::rbac::{RbacStore, StaticRbacStore};
use crate::guard::{GuardDecision, ToolCallRequest, ToolGuard};
use crate::limiter::SlidingWindowLimiter;
use crate::redteam::corpus::AttackCorpus;
use crate::redteam::gate::RedTeamGate;
use crate::redteam::{RedTeamHarness, RedTeamReport};
use crate::scanner::{ScanResult, Scanner, ScanThresholds};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct SecurityGateway {
    catalog: Arc<CatalogHandle>,
    scanner: Arc<Scanner>,
    guard: Arc<ToolGuard>,
    audit: Arc<AuditPipeline>,
    retention: Arc<RetentionManager>,
    redteam: RedTeamHarness,
}

impl SecurityGateway {
    /// Assemble the gateway. Must run inside a tokio runtime (the audit
    /// writer task spawns here).
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let catalog = match &config.catalog_path {
            Some(path) => PatternCatalog::from_yaml_file(path)?,
            None => PatternCatalog::builtin(),
        };
        let catalog = Arc::new(CatalogHandle::new(catalog));
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&catalog),
            ScanThresholds::from(config),
        ));

        let rbac: Arc<dyn RbacStore> = match &config.rbac_path {
            Some(path) => Arc::new(StaticRbacStore::from_yaml_file(path)?),
            None => Arc::new(StaticRbacStore::builtin()),
        };

        let sink: Arc<dyn DurableSink> = match &config.audit_log_path {
            Some(path) => Arc::new(JsonlSink::new(path)),
            None => Arc::new(MemorySink::default()),
        };
        let archive: Arc<dyn ArchiveSink> = match &config.archive_path {
            Some(path) => Arc::new(JsonlArchive::new(path)),
            None => Arc::new(MemoryArchive::default()),
        };
        let audit = AuditPipeline::new(config.audit_buffer_capacity, sink);
        let retention = Arc::new(RetentionManager::new(
            archive,
            Arc::clone(&audit),
            RetentionPolicy {
                max_age_secs: config.retention_max_age_secs,
            },
        ));

        let guard = Arc::new(ToolGuard::new(
            Arc::clone(&scanner),
            rbac,
            Arc::clone(&audit),
        ));

        let gate = RedTeamGate::new(
            config.redteam_passphrase_hash.clone(),
            Arc::new(SlidingWindowLimiter::new(
                config.redteam_rate_limit,
                Duration::from_secs(config.redteam_rate_window_secs),
            )),
        );
        let redteam = RedTeamHarness::new(
            gate,
            Arc::clone(&scanner),
            Arc::clone(&guard),
            Arc::clone(&audit),
        );

        info!(
            block_threshold = config.block_threshold,
            warn_threshold = config.warn_threshold,
            buffer_capacity = config.audit_buffer_capacity,
            "gateway assembled"
        );
        Ok(Self {
            catalog,
            scanner,
            guard,
            audit,
            retention,
            redteam,
        })
    }

    /// Scan free text on behalf of `actor`, recording the verdict.
    pub fn scan(&self, actor: &str, text: &str) -> Result<ScanResult, GatewayError> {
        let result = self.scanner.scan(text)?;
        let event_type = if result.is_threat() {
            AuditEventType::ThreatDetected
        } else {
            AuditEventType::Scan
        };
        self.audit.append(
            AuditEvent::new(
                actor,
                event_type,
                result.severity,
                serde_json::json!({
                    "decision": result.decision,
                    "matched": result
                        .matched_patterns
                        .iter()
                        .map(|m| m.pattern_id.as_str())
                        .collect::<Vec<_>>(),
                    "truncated": result.truncated,
                }),
            )
            .with_score(result.aggregate_score),
        );
        Ok(result)
    }

    pub async fn guard_check(&self, req: &ToolCallRequest) -> GuardDecision {
        self.guard.check(req).await
    }

    pub async fn check_output(
        &self,
        agent_id: &str,
        tool_name: &str,
        output: &str,
    ) -> GuardDecision {
        self.guard.check_output(agent_id, tool_name, output).await
    }

    pub fn audit_query(
        &self,
        filter: &QueryFilter,
        page: usize,
        page_size: usize,
    ) -> Page<AuditEvent> {
        self.audit.query(filter, page, page_size)
    }

    pub async fn retention_stats(&self) -> Result<RetentionStats, GatewayError> {
        self.retention.stats().await
    }

    /// Aggregate the durable log over `[start, end]` into a compliance
    /// report. Open bounds cover everything on that side.
    pub async fn compliance_report(
        &self,
        start: Option<chrono::DateTime<chrono::Utc>>,
        end: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<ComplianceReport, GatewayError> {
        self.audit.flush().await?;
        let sink = self.audit.sink();
        report::generate(sink.as_ref(), start, end).await
    }

    /// One archive-then-purge pass; returns (archived, purged).
    pub async fn run_retention(&self) -> Result<(usize, usize), GatewayError> {
        self.retention.run_pass().await
    }

    pub fn retention_manager(&self) -> Arc<RetentionManager> {
        Arc::clone(&self.retention)
    }

    pub async fn red_team(
        &self,
        caller: &str,
        passphrase: &str,
        corpus_id: &str,
    ) -> Result<RedTeamReport, GatewayError> {
        self.redteam.execute(caller, passphrase, corpus_id).await
    }

    pub fn register_corpus(&mut self, corpus: AttackCorpus) {
        self.redteam.register_corpus(corpus);
    }

    /// Swap in a new detection catalog; in-flight scans keep their snapshot.
    pub fn reload_catalog(&self, path: &Path) -> Result<(), GatewayError> {
        let catalog = PatternCatalog::from_yaml_file(path)?;
        let version = catalog.version;
        self.catalog.swap(catalog)?;
        info!(version, "detection catalog reloaded");
        Ok(())
    }

    /// Drain the audit writer before exit so no confirmed event is lost.
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        self.audit.flush().await
    }
}
