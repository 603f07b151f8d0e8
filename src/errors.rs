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

//! Error taxonomy for the gateway.
//!
//! `PolicyDenied` and `RateLimited` are expected, reported outcomes, not
//! internal faults: callers must observe them explicitly. `StorageUnavailable`
//! on the RBAC dependency resolves to a fail-closed deny in the guard; on the
//! audit sink it degrades to buffered-only operation.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// Malformed structured input. Free text is never rejected for size
    /// (the scanner truncates instead); this covers structured requests.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// RBAC or a scan threshold produced a block. A correct decision,
    /// not a system fault.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// Bad red-team passphrase or capability token. Deliberately carries no
    /// detail about how close the attempt was.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Durable audit sink or RBAC store unreachable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::StorageUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(format!("serialization: {}", e))
    }
}
