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

//! Time utilities.
//!
//! Consistent UTC timestamps for audit events and retention cutoffs.

use chrono::{DateTime, Duration, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Cutoff timestamp `max_age_secs` before now. Captured once at the start of
/// a retention pass so late-arriving events are never evaluated against a
/// moving target.
pub fn cutoff_before(max_age_secs: u64) -> DateTime<Utc> {
    Utc::now() - Duration::seconds(max_age_secs as i64)
}
