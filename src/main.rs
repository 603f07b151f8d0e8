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

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use promptwall::audit::{AuditEventType, QueryFilter};
use promptwall::constants;
use promptwall::guard::ToolCallRequest;
use promptwall::redteam::gate::hash_passphrase;
use promptwall::{Config, SecurityGateway};
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "promptwall", about = "Security gateway for AI agent interactions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan free text for injection attempts
    Scan {
        text: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Vet a tool call (RBAC + parameter scan)
    Guard {
        #[arg(long)]
        tool: String,
        #[arg(long)]
        role: String,
        #[arg(long, default_value = "cli")]
        agent: String,
        /// Parameters as key=value, repeatable
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// Scan tool output before it re-enters the conversation
    CheckOutput {
        #[arg(long)]
        tool: String,
        text: String,
        #[arg(long, default_value = "cli")]
        agent: String,
    },
    /// Query recent audit events
    Audit {
        #[arg(long)]
        event_type: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Retention statistics
    Stats,
    /// Generate a compliance report over the durable audit log
    Report {
        /// Period start, RFC 3339 (open if omitted)
        #[arg(long)]
        start: Option<String>,
        /// Period end, RFC 3339 (open if omitted)
        #[arg(long)]
        end: Option<String>,
    },
    /// Run one archive-then-purge retention pass
    Retention,
    /// Run the red-team harness (passphrase via PROMPTWALL_REDTEAM_PASSPHRASE)
    RedTeam {
        #[arg(long, default_value = constants::redteam::BUILTIN_CORPUS_ID)]
        corpus: String,
        #[arg(long, default_value = "cli")]
        caller: String,
    },
    /// Hash a passphrase for PROMPTWALL_REDTEAM_PASSPHRASE_HASH
    HashPassphrase { passphrase: String },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .with_context(|| format!("expected KEY=VALUE, got '{}'", item))?;
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .with_context(|| format!("expected an RFC 3339 timestamp, got '{}'", raw))
}

fn parse_event_type(raw: &str) -> Result<AuditEventType> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .with_context(|| format!("unknown event type '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(&config);

    // hash-passphrase needs no gateway (and must work before one is configured)
    if let Command::HashPassphrase { passphrase } = &cli.command {
        println!("{}", hash_passphrase(passphrase)?);
        return Ok(());
    }

    let gateway = SecurityGateway::new(&config)?;

    match cli.command {
        Command::Scan { text, actor } => {
            let result = gateway.scan(&actor, &text)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            gateway.shutdown().await?;
            if result.is_threat() {
                std::process::exit(1);
            }
        }
        Command::Guard {
            tool,
            role,
            agent,
            params,
        } => {
            let decision = gateway
                .guard_check(&ToolCallRequest {
                    agent_id: agent,
                    tool_name: tool,
                    requested_role: role,
                    parameters: parse_params(&params)?,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            gateway.shutdown().await?;
            if !decision.allow {
                std::process::exit(1);
            }
        }
        Command::CheckOutput { tool, text, agent } => {
            let decision = gateway.check_output(&agent, &tool, &text).await;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            gateway.shutdown().await?;
            if !decision.allow {
                std::process::exit(1);
            }
        }
        Command::Audit {
            event_type,
            actor,
            page,
            page_size,
        } => {
            let filter = QueryFilter {
                event_type: event_type.as_deref().map(parse_event_type).transpose()?,
                actor,
                ..Default::default()
            };
            let result = gateway.audit_query(&filter, page, page_size);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stats => {
            let stats = gateway.retention_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Report { start, end } => {
            let start = start.as_deref().map(parse_timestamp).transpose()?;
            let end = end.as_deref().map(parse_timestamp).transpose()?;
            let report = gateway.compliance_report(start, end).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Retention => {
            let (archived, purged) = gateway.run_retention().await?;
            println!("archived {} events, purged {}", archived, purged);
            gateway.shutdown().await?;
        }
        Command::RedTeam { corpus, caller } => {
            let Ok(passphrase) = std::env::var(constants::config::ENV_REDTEAM_PASSPHRASE) else {
                bail!(
                    "set {} to run the harness",
                    constants::config::ENV_REDTEAM_PASSPHRASE
                );
            };
            let report = gateway.red_team(&caller, &passphrase, &corpus).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            gateway.shutdown().await?;
            if report.failed > 0 {
                std::process::exit(1);
            }
        }
        Command::HashPassphrase { .. } => unreachable!("handled above"),
    }
    Ok(())
}
