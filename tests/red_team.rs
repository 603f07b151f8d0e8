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

//! Red-team harness: authorization gating, rate limiting, and corpus
//! replay against the live defenses.

use promptwall::audit::{AuditEventType, QueryFilter};
use promptwall::catalog::Severity;
use promptwall::errors::GatewayError;
use promptwall::redteam::gate::hash_passphrase;
use promptwall::{Config, SecurityGateway};

const PASSPHRASE: &str = "hunter2-but-long-and-random";

fn gateway() -> SecurityGateway {
    let config = Config {
        redteam_passphrase_hash: Some(hash_passphrase(PASSPHRASE).unwrap()),
        ..Config::default()
    };
    SecurityGateway::new(&config).unwrap()
}

#[tokio::test]
async fn builtin_corpus_runs_clean() {
    let gateway = gateway();
    let report = gateway
        .red_team("tester", PASSPHRASE, "builtin")
        .await
        .unwrap();

    assert!(report.total >= 30);
    assert_eq!(report.failed, 0, "bypassed: {:?}", report.bypassed);
    assert_eq!(report.pass_rate, 1.0);
    assert!(report.false_positives.is_empty());

    // Every attempt audited, plus the aggregate event.
    let attempts = gateway.audit_query(
        &QueryFilter {
            event_type: Some(AuditEventType::RedTeamAttempt),
            ..Default::default()
        },
        0,
        1,
    );
    assert_eq!(attempts.total, report.total);
    let runs = gateway.audit_query(
        &QueryFilter {
            event_type: Some(AuditEventType::RedTeamRun),
            ..Default::default()
        },
        0,
        1,
    );
    assert_eq!(runs.total, 1);
}

#[tokio::test]
async fn wrong_passphrase_fails_without_detail_and_is_audited() {
    let gateway = gateway();
    let err = gateway
        .red_team("tester", "not-the-passphrase", "builtin")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AuthenticationFailed));
    // The error carries no hint of why authentication failed.
    assert_eq!(err.to_string(), "authentication failed");

    let page = gateway.audit_query(
        &QueryFilter {
            event_type: Some(AuditEventType::RedTeamAuthFail),
            ..Default::default()
        },
        0,
        10,
    );
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].severity, Severity::Critical);
}

#[tokio::test]
async fn rate_limit_applies_before_passphrase_verification() {
    let config = Config {
        redteam_passphrase_hash: Some(hash_passphrase(PASSPHRASE).unwrap()),
        redteam_rate_limit: 3,
        ..Config::default()
    };
    let gateway = SecurityGateway::new(&config).unwrap();

    // Burn the window with wrong guesses.
    for _ in 0..3 {
        let err = gateway
            .red_team("flooder", "guess", "builtin")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationFailed));
    }

    // Fourth attempt carries the CORRECT passphrase but must be rejected as
    // rate limited: the limiter runs before any verification happens.
    let err = gateway
        .red_team("flooder", PASSPHRASE, "builtin")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RateLimited(_)));

    // A different caller is unaffected.
    let report = gateway
        .red_team("other", PASSPHRASE, "builtin")
        .await
        .unwrap();
    assert!(report.total > 0);
}

#[tokio::test]
async fn unknown_corpus_is_rejected_after_authorization() {
    let gateway = gateway();
    let err = gateway
        .red_team("tester", PASSPHRASE, "no-such-corpus")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidInput(_)));
}

#[tokio::test]
async fn unconfigured_harness_rejects_everyone() {
    let gateway = SecurityGateway::new(&Config::default()).unwrap();
    let err = gateway
        .red_team("tester", "anything", "builtin")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AuthenticationFailed));
}
