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

use crate::constants;
use crate::errors::GatewayError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Process-wide gateway configuration. Read once at startup, never mutated
/// at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub log_format: String, // "json" or "text"

    /// Aggregate score at which a scan decision becomes `block`.
    pub block_threshold: f64,
    /// Aggregate score at which a scan decision becomes `flag`.
    pub warn_threshold: f64,
    /// Inputs longer than this are truncated before scanning.
    pub max_input_length: usize,

    /// Ring buffer capacity; also bounds the durable-writer queue.
    pub audit_buffer_capacity: usize,
    /// Retention age in seconds for archive/purge eligibility.
    pub retention_max_age_secs: u64,
    pub audit_log_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,

    /// Optional YAML catalog overriding the built-in detection rules.
    pub catalog_path: Option<PathBuf>,
    /// Optional YAML role table overriding the built-in RBAC rules.
    pub rbac_path: Option<PathBuf>,

    /// Argon2 PHC hash of the red-team passphrase. Unset means the harness
    /// rejects every invocation.
    pub redteam_passphrase_hash: Option<String>,
    pub redteam_rate_limit: u32,
    pub redteam_rate_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            log_level: env::var(constants::config::ENV_LOG_LEVEL)
                .unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(constants::config::ENV_LOG_FORMAT)
                .unwrap_or_else(|_| "text".to_string()),
            block_threshold: parse_env(
                constants::config::ENV_BLOCK_THRESHOLD,
                constants::scoring::DEFAULT_BLOCK_THRESHOLD,
            )?,
            warn_threshold: parse_env(
                constants::config::ENV_WARN_THRESHOLD,
                constants::scoring::DEFAULT_WARN_THRESHOLD,
            )?,
            max_input_length: parse_env(
                constants::config::ENV_MAX_INPUT_LENGTH,
                constants::limits::DEFAULT_MAX_INPUT_LENGTH,
            )?,
            audit_buffer_capacity: parse_env(
                constants::config::ENV_AUDIT_BUFFER_CAPACITY,
                constants::audit::DEFAULT_BUFFER_CAPACITY,
            )?,
            retention_max_age_secs: parse_env(
                constants::config::ENV_RETENTION_MAX_AGE_SECS,
                constants::audit::DEFAULT_MAX_AGE_SECS,
            )?,
            audit_log_path: env::var(constants::config::ENV_AUDIT_LOG_PATH)
                .ok()
                .map(PathBuf::from),
            archive_path: env::var(constants::config::ENV_ARCHIVE_PATH)
                .ok()
                .map(PathBuf::from),
            catalog_path: env::var(constants::config::ENV_CATALOG_PATH)
                .ok()
                .map(PathBuf::from),
            rbac_path: env::var(constants::config::ENV_RBAC_PATH)
                .ok()
                .map(PathBuf::from),
            redteam_passphrase_hash: env::var(constants::config::ENV_REDTEAM_PASSPHRASE_HASH).ok(),
            redteam_rate_limit: parse_env(
                constants::config::ENV_REDTEAM_RATE_LIMIT,
                constants::redteam::DEFAULT_RATE_LIMIT_MAX,
            )?,
            redteam_rate_window_secs: parse_env(
                constants::config::ENV_REDTEAM_RATE_WINDOW_SECS,
                constants::redteam::DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, GatewayError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| GatewayError::InvalidInput(format!("{}: unparseable value", name))),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            block_threshold: constants::scoring::DEFAULT_BLOCK_THRESHOLD,
            warn_threshold: constants::scoring::DEFAULT_WARN_THRESHOLD,
            max_input_length: constants::limits::DEFAULT_MAX_INPUT_LENGTH,
            audit_buffer_capacity: constants::audit::DEFAULT_BUFFER_CAPACITY,
            retention_max_age_secs: constants::audit::DEFAULT_MAX_AGE_SECS,
            audit_log_path: None,
            archive_path: None,
            catalog_path: None,
            rbac_path: None,
            redteam_passphrase_hash: None,
            redteam_rate_limit: constants::redteam::DEFAULT_RATE_LIMIT_MAX,
            redteam_rate_window_secs: constants::redteam::DEFAULT_RATE_LIMIT_WINDOW_SECS,
        }
    }
}
