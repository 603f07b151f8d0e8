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

//! Sliding-window rate limiting keyed by caller.
//!
//! The red-team gate consults this before any credential work so that
//! passphrase guessing is throttled rather than oracle'd.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait RateLimiter: Send + Sync {
    /// Record an attempt for `key` and report whether it is within the
    /// window budget. Denied attempts still count.
    fn allow(&self, key: &str) -> bool;
}

pub struct SlidingWindowLimiter {
    window: Duration,
    max_attempts: u32,
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            window,
            max_attempts: max_attempts.max(1),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn remaining(&self, key: &str) -> u32 {
        let now = Instant::now();
        let mut attempts = lock(&self.attempts);
        let queue = attempts.entry(key.to_string()).or_default();
        prune(queue, now, self.window);
        self.max_attempts.saturating_sub(queue.len() as u32)
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut attempts = lock(&self.attempts);
        let queue = attempts.entry(key.to_string()).or_default();
        prune(queue, now, self.window);
        let within = (queue.len() as u32) < self.max_attempts;
        queue.push_back(now);
        within
    }
}

fn prune(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = queue.front() {
        if now.duration_since(front) >= window {
            queue.pop_front();
        } else {
            break;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}
