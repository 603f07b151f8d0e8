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

//! Kani proofs over small models of the gateway's safety invariants.
//!
//! These verify the decision logic in the abstract: deny-overrides-allow,
//! fail-closed on faults, archive-before-purge ordering, and the ring
//! buffer capacity bound. Run with `cargo kani`.

/// Model of the guard's combine step: three-valued RBAC, three-valued scan.
/// `None` stands for an internal fault in either stage.
fn guard_allows(rbac: Option<bool>, scan: Option<bool>) -> bool {
    matches!((rbac, scan), (Some(true), Some(true)))
}

#[kani::proof]
fn deny_overrides_allow() {
    let rbac: Option<bool> = kani::any();
    let scan: Option<bool> = kani::any();
    let allow = guard_allows(rbac, scan);
    // A deny from either stage is never overturned by the other.
    if rbac == Some(false) || scan == Some(false) {
        assert!(!allow);
    }
}

#[kani::proof]
fn faults_fail_closed() {
    let rbac: Option<bool> = kani::any();
    let scan: Option<bool> = kani::any();
    let allow = guard_allows(rbac, scan);
    if rbac.is_none() || scan.is_none() {
        assert!(!allow);
    }
}

/// Event lifecycle model: append -> archived -> purged.
#[derive(Clone, Copy, PartialEq)]
enum EventState {
    Live,
    Archived,
    Purged,
}

fn retention_step(state: EventState, archive_ok: bool, purge_requested: bool) -> EventState {
    match state {
        EventState::Live if archive_ok => EventState::Archived,
        EventState::Archived if purge_requested => EventState::Purged,
        other => other,
    }
}

#[kani::proof]
fn purge_requires_archive() {
    let archive_ok: bool = kani::any();
    let purge_requested: bool = kani::any();
    let mut state = EventState::Live;
    // Two retention passes over one event.
    for _ in 0..2 {
        state = retention_step(state, archive_ok, purge_requested);
    }
    // An event that was never archived cannot have been purged.
    if !archive_ok {
        assert!(state != EventState::Purged);
    }
}

#[kani::proof]
fn ring_buffer_never_exceeds_capacity() {
    let capacity: usize = kani::any();
    kani::assume(capacity >= 1 && capacity <= 8);
    let appends: usize = kani::any();
    kani::assume(appends <= 16);

    let mut len: usize = 0;
    let mut dropped: usize = 0;
    for _ in 0..appends {
        if len >= capacity {
            len -= 1;
            dropped += 1;
        }
        len += 1;
    }
    assert!(len <= capacity);
    // Every evicted append is accounted for.
    assert!(len + dropped == appends);
}
