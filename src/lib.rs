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

//! Promptwall: a security gateway for AI agent interactions.
//!
//! Every prompt, tool call, and tool output crossing the boundary is scanned
//! against a weighted detection catalog; tool calls additionally pass
//! role-based authorization. Both checks fail closed. Every decision lands
//! in a bounded audit pipeline with archive-before-purge retention, and a
//! passphrase-gated red-team harness replays a curated attack corpus against
//! the live defenses.
//!
//! Entry point is [`service::SecurityGateway`]; everything underneath is
//! usable on its own.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod errors;
pub mod guard;
pub mod limiter;
pub mod redteam;
pub mod scanner;
pub mod service;
pub mod utils;

#[cfg(kani)]
mod verification;

pub use config::Config;
pub use errors::GatewayError;
pub use service::SecurityGateway;
