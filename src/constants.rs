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

//! Gateway constants - single source of truth for thresholds, limits,
//! reason codes, and environment variable names.

/// Scan decision thresholds and severity cut points.
pub mod scoring {
    /// Aggregate score at or above which the decision is `block`.
    pub const DEFAULT_BLOCK_THRESHOLD: f64 = 0.6;
    /// Aggregate score at or above which the decision is `flag`.
    pub const DEFAULT_WARN_THRESHOLD: f64 = 0.3;
    /// Severity cut points partitioning [0, 1].
    pub const SEVERITY_MEDIUM_CUT: f64 = 0.3;
    pub const SEVERITY_HIGH_CUT: f64 = 0.6;
    pub const SEVERITY_CRITICAL_CUT: f64 = 0.85;
}

/// Input bounds (DoS protection).
pub mod limits {
    /// Maximum text length scanned; longer inputs are truncated, not rejected.
    pub const DEFAULT_MAX_INPUT_LENGTH: usize = 64 * 1024;
    /// Maximum raw payload bytes retained on an audit event.
    pub const MAX_RAW_PAYLOAD_BYTES: usize = 4 * 1024;
    /// Excerpt length recorded per pattern match.
    pub const MATCH_EXCERPT_LENGTH: usize = 120;
}

/// Audit pipeline defaults.
pub mod audit {
    /// Ring buffer (and writer queue) capacity.
    pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;
    /// Retention age after which events become archive/purge candidates.
    pub const DEFAULT_MAX_AGE_SECS: u64 = 90 * 24 * 60 * 60;
}

/// Red-team harness gating.
pub mod redteam {
    /// Sliding-window attempts permitted per caller.
    pub const DEFAULT_RATE_LIMIT_MAX: u32 = 3;
    /// Sliding-window length in seconds.
    pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 300;
    /// Capability token lifetime in seconds.
    pub const TOKEN_TTL_SECS: u64 = 60;
    /// Identifier of the built-in corpus.
    pub const BUILTIN_CORPUS_ID: &str = "builtin";
}

/// RBAC capability strings.
pub mod capability {
    /// Blanket right to invoke any tool at all.
    pub const TOOL_EXEC: &str = "tool:exec";
    /// Per-tool capability prefix; `tool:*` grants every tool.
    pub const TOOL_PREFIX: &str = "tool:";
    pub const TOOL_WILDCARD: &str = "tool:*";
}

/// Stable reason codes on guard denials.
pub mod reason {
    pub const RBAC_DENIED: &str = "rbac_denied";
    pub const RBAC_UNAVAILABLE: &str = "rbac_unavailable";
    pub const SCAN_BLOCKED: &str = "scan_blocked";
    pub const SCANNER_FAILED: &str = "scanner_failed";
    pub const ALLOWED: &str = "allowed";
}

/// Configuration environment variables.
pub mod config {
    pub const ENV_LOG_LEVEL: &str = "PROMPTWALL_LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "PROMPTWALL_LOG_FORMAT";
    pub const ENV_BLOCK_THRESHOLD: &str = "PROMPTWALL_BLOCK_THRESHOLD";
    pub const ENV_WARN_THRESHOLD: &str = "PROMPTWALL_WARN_THRESHOLD";
    pub const ENV_MAX_INPUT_LENGTH: &str = "PROMPTWALL_MAX_INPUT_LENGTH";
    pub const ENV_AUDIT_BUFFER_CAPACITY: &str = "PROMPTWALL_AUDIT_BUFFER_CAPACITY";
    pub const ENV_RETENTION_MAX_AGE_SECS: &str = "PROMPTWALL_RETENTION_MAX_AGE_SECS";
    pub const ENV_AUDIT_LOG_PATH: &str = "PROMPTWALL_AUDIT_LOG_PATH";
    pub const ENV_ARCHIVE_PATH: &str = "PROMPTWALL_ARCHIVE_PATH";
    pub const ENV_CATALOG_PATH: &str = "PROMPTWALL_CATALOG_PATH";
    pub const ENV_RBAC_PATH: &str = "PROMPTWALL_RBAC_PATH";
    pub const ENV_REDTEAM_PASSPHRASE_HASH: &str = "PROMPTWALL_REDTEAM_PASSPHRASE_HASH";
    /// Plaintext passphrase for CLI red-team runs; never stored.
    pub const ENV_REDTEAM_PASSPHRASE: &str = "PROMPTWALL_REDTEAM_PASSPHRASE";
    pub const ENV_REDTEAM_RATE_LIMIT: &str = "PROMPTWALL_REDTEAM_RATE_LIMIT";
    pub const ENV_REDTEAM_RATE_WINDOW_SECS: &str = "PROMPTWALL_REDTEAM_RATE_WINDOW_SECS";
}
