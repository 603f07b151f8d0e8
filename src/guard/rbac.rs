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

//! Role-based access control behind the tool guard.
//!
//! [`RbacStore`] is the seam: the guard only ever asks "does role R hold
//! capability C", and any answer other than a confident yes is a deny.
//! [`StaticRbacStore`] is the default data-driven implementation, loadable
//! from YAML or seeded with the built-in role table.

use crate::constants::capability;
use crate::errors::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[async_trait]
pub trait RbacStore: Send + Sync {
    /// Whether `role` holds `cap`. Unknown roles are `Ok(false)`, never an
    /// error; `Err` is reserved for store faults and makes the guard deny.
    async fn has_capability(&self, role: &str, cap: &str) -> Result<bool, GatewayError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRule {
    pub role: String,
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleTable {
    pub roles: Vec<RoleRule>,
}

/// In-memory role table. Capabilities are exact strings plus the `tool:*`
/// wildcard, which grants every tool-scoped capability but not `tool:exec`
/// itself (a role must hold the blanket execute right explicitly).
pub struct StaticRbacStore {
    grants: HashMap<String, BTreeSet<String>>,
}

impl StaticRbacStore {
    pub fn from_table(table: RoleTable) -> Result<Self, GatewayError> {
        let mut grants: HashMap<String, BTreeSet<String>> = HashMap::new();
        for rule in table.roles {
            if rule.role.trim().is_empty() {
                return Err(GatewayError::InvalidInput(
                    "rbac: empty role name".to_string(),
                ));
            }
            if grants
                .insert(rule.role.clone(), rule.capabilities)
                .is_some()
            {
                return Err(GatewayError::InvalidInput(format!(
                    "rbac: duplicate role '{}'",
                    rule.role
                )));
            }
        }
        Ok(Self { grants })
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path)?;
        let table: RoleTable = serde_yaml_ng::from_str(&raw)
            .map_err(|e| GatewayError::InvalidInput(format!("rbac: {}", e)))?;
        Self::from_table(table)
    }

    /// Default role table. Orchestrators run anything, analysts run a fixed
    /// read-only toolset, auditors only query the audit log, restricted
    /// agents run nothing.
    pub fn builtin() -> Self {
        let caps = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        let table = RoleTable {
            roles: vec![
                RoleRule {
                    role: "orchestrator".to_string(),
                    capabilities: caps(&[capability::TOOL_EXEC, capability::TOOL_WILDCARD]),
                    description: "Full tool execution".to_string(),
                },
                RoleRule {
                    role: "analyst".to_string(),
                    capabilities: caps(&[
                        capability::TOOL_EXEC,
                        "tool:search",
                        "tool:summarize",
                        "tool:read_file",
                    ]),
                    description: "Read-only analysis tools".to_string(),
                },
                RoleRule {
                    role: "auditor".to_string(),
                    capabilities: caps(&[capability::TOOL_EXEC, "tool:audit_query"]),
                    description: "Audit log access only".to_string(),
                },
                RoleRule {
                    role: "restricted".to_string(),
                    capabilities: BTreeSet::new(),
                    description: "No tool execution".to_string(),
                },
            ],
        };
        match Self::from_table(table) {
            Ok(store) => store,
            Err(_) => unreachable!("builtin role table is well formed"),
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.grants.keys().map(String::as_str)
    }
}

#[async_trait]
impl RbacStore for StaticRbacStore {
    async fn has_capability(&self, role: &str, cap: &str) -> Result<bool, GatewayError> {
        let Some(caps) = self.grants.get(role) else {
            return Ok(false);
        };
        if caps.contains(cap) {
            return Ok(true);
        }
        // Wildcard covers tool-name capabilities, never the blanket
        // execute right.
        if cap.starts_with(capability::TOOL_PREFIX)
            && cap != capability::TOOL_EXEC
            && caps.contains(capability::TOOL_WILDCARD)
        {
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_role_is_denied_not_an_error() {
        let store = StaticRbacStore::builtin();
        assert!(!store.has_capability("ghost", capability::TOOL_EXEC).await.unwrap());
    }

    #[tokio::test]
    async fn wildcard_grants_tool_names_but_not_exec() {
        let store = StaticRbacStore::from_table(RoleTable {
            roles: vec![RoleRule {
                role: "wild".to_string(),
                capabilities: [capability::TOOL_WILDCARD.to_string()].into_iter().collect(),
                description: String::new(),
            }],
        })
        .unwrap();
        assert!(store.has_capability("wild", "tool:anything").await.unwrap());
        assert!(!store.has_capability("wild", capability::TOOL_EXEC).await.unwrap());
    }

    #[tokio::test]
    async fn analyst_limited_to_listed_tools() {
        let store = StaticRbacStore::builtin();
        assert!(store.has_capability("analyst", "tool:search").await.unwrap());
        assert!(!store
            .has_capability("analyst", "tool:delete_file")
            .await
            .unwrap());
    }

    #[test]
    fn duplicate_roles_rejected() {
        let rule = RoleRule {
            role: "dup".to_string(),
            capabilities: BTreeSet::new(),
            description: String::new(),
        };
        let err = StaticRbacStore::from_table(RoleTable {
            roles: vec![rule.clone(), rule],
        });
        assert!(err.is_err());
    }
}
