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

//! Authorization gate for the red-team harness.
//!
//! Order is load-bearing: the rate limiter is consulted before any
//! passphrase work, so a flooding caller is throttled without ever reaching
//! the verifier. Verification is Argon2 against a PHC-format hash; success
//! mints a single-use, short-lived, HMAC-signed capability token. Failure
//! detail is never surfaced to the caller.

use crate::constants::redteam::TOKEN_TTL_SECS;
use crate::errors::GatewayError;
use crate::limiter::RateLimiter;
use crate::utils::time;
use argon2::password_hash::{rand_core::OsRng as SaltRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;
const MAC_LEN: usize = 32;

/// Hash a passphrase for storage (PHC string, random salt).
pub fn hash_passphrase(passphrase: &str) -> Result<String, GatewayError> {
    let salt = SaltString::generate(&mut SaltRng);
    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| GatewayError::Internal(format!("passphrase hashing failed: {}", e)))
}

fn verify_passphrase(passphrase: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(passphrase.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Short-lived, single-use proof that the gate authorized a harness run.
#[derive(Debug, Clone)]
pub struct CapabilityToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct RedTeamGate {
    passphrase_hash: Option<String>,
    limiter: Arc<dyn RateLimiter>,
    signing_key: [u8; 32],
    /// Outstanding nonces; redeemed or expired entries are removed.
    outstanding: Mutex<HashMap<[u8; NONCE_LEN], DateTime<Utc>>>,
}

impl RedTeamGate {
    pub fn new(passphrase_hash: Option<String>, limiter: Arc<dyn RateLimiter>) -> Self {
        let mut signing_key = [0u8; 32];
        rand::rng().fill_bytes(&mut signing_key);
        Self {
            passphrase_hash,
            limiter,
            signing_key,
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    /// Rate limit, verify, mint. Errors are deliberately coarse: callers
    /// learn "rate limited" or "authentication failed" and nothing else.
    /// Argon2 verification is CPU-bound, so it runs on the blocking pool
    /// instead of stalling the async executor.
    pub async fn authorize(
        &self,
        caller: &str,
        passphrase: &str,
    ) -> Result<CapabilityToken, GatewayError> {
        if !self.limiter.allow(caller) {
            return Err(GatewayError::RateLimited(
                "red-team authorization attempts exceeded".to_string(),
            ));
        }
        let Some(ref phc) = self.passphrase_hash else {
            return Err(GatewayError::AuthenticationFailed);
        };
        let passphrase = passphrase.to_string();
        let phc = phc.clone();
        let verified =
            tokio::task::spawn_blocking(move || verify_passphrase(&passphrase, &phc))
                .await
                .map_err(|e| GatewayError::Internal(format!("verifier task failed: {}", e)))?;
        if !verified {
            return Err(GatewayError::AuthenticationFailed);
        }
        Ok(self.mint())
    }

    fn mint(&self) -> CapabilityToken {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let expires_at = time::now() + chrono::Duration::seconds(TOKEN_TTL_SECS as i64);

        let mut payload = Vec::with_capacity(NONCE_LEN + 8 + MAC_LEN);
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&expires_at.timestamp().to_be_bytes());
        let mac = self.sign(&payload);
        payload.extend_from_slice(&mac);

        let mut outstanding = lock(&self.outstanding);
        outstanding.retain(|_, exp| *exp > time::now());
        outstanding.insert(nonce, expires_at);

        CapabilityToken {
            token: URL_SAFE_NO_PAD.encode(payload),
            expires_at,
        }
    }

    /// Redeem a token. Consumes it: a second redemption of the same token
    /// fails even inside the TTL.
    pub fn redeem(&self, token: &str) -> Result<(), GatewayError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| GatewayError::AuthenticationFailed)?;
        if bytes.len() != NONCE_LEN + 8 + MAC_LEN {
            return Err(GatewayError::AuthenticationFailed);
        }
        let (payload, mac) = bytes.split_at(NONCE_LEN + 8);
        let expected = self.sign(payload);
        if expected.ct_eq(mac).unwrap_u8() != 1 {
            return Err(GatewayError::AuthenticationFailed);
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&payload[..NONCE_LEN]);
        let mut expiry_bytes = [0u8; 8];
        expiry_bytes.copy_from_slice(&payload[NONCE_LEN..]);
        let expiry = i64::from_be_bytes(expiry_bytes);
        if time::now().timestamp() >= expiry {
            return Err(GatewayError::AuthenticationFailed);
        }

        let mut outstanding = lock(&self.outstanding);
        if outstanding.remove(&nonce).is_none() {
            return Err(GatewayError::AuthenticationFailed);
        }
        Ok(())
    }

    fn sign(&self, payload: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = match HmacSha256::new_from_slice(&self.signing_key) {
            Ok(m) => m,
            // HMAC accepts any key length; 32 bytes cannot fail.
            Err(_) => unreachable!("fixed-size hmac key"),
        };
        mac.update(payload);
        let mut out = [0u8; MAC_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::SlidingWindowLimiter;
    use std::time::Duration;

    fn gate(hash: Option<String>, max_attempts: u32) -> RedTeamGate {
        RedTeamGate::new(
            hash,
            Arc::new(SlidingWindowLimiter::new(
                max_attempts,
                Duration::from_secs(300),
            )),
        )
    }

    #[tokio::test]
    async fn correct_passphrase_mints_redeemable_token() {
        let hash = hash_passphrase("open sesame").unwrap();
        let gate = gate(Some(hash), 5);
        let token = gate.authorize("tester", "open sesame").await.unwrap();
        gate.redeem(&token.token).unwrap();
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let hash = hash_passphrase("open sesame").unwrap();
        let gate = gate(Some(hash), 5);
        let token = gate.authorize("tester", "open sesame").await.unwrap();
        gate.redeem(&token.token).unwrap();
        assert!(matches!(
            gate.redeem(&token.token),
            Err(GatewayError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn wrong_passphrase_rejected_without_detail() {
        let hash = hash_passphrase("open sesame").unwrap();
        let gate = gate(Some(hash), 5);
        assert!(matches!(
            gate.authorize("tester", "guess").await,
            Err(GatewayError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn unset_hash_rejects_everything() {
        let gate = gate(None, 5);
        assert!(matches!(
            gate.authorize("tester", "anything").await,
            Err(GatewayError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn limiter_consulted_before_verification() {
        // A limiter with budget 1: the first call burns it even with the
        // right passphrase, and the second must fail as RateLimited, not
        // AuthenticationFailed.
        let hash = hash_passphrase("open sesame").unwrap();
        let gate = gate(Some(hash), 1);
        gate.authorize("tester", "open sesame").await.unwrap();
        assert!(matches!(
            gate.authorize("tester", "open sesame").await,
            Err(GatewayError::RateLimited(_))
        ));
    }

    #[tokio::test]
    async fn tampered_token_rejected() {
        let hash = hash_passphrase("open sesame").unwrap();
        let gate = gate(Some(hash), 5);
        let token = gate.authorize("tester", "open sesame").await.unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(&token.token).unwrap();
        raw[0] ^= 0xff;
        let forged = URL_SAFE_NO_PAD.encode(raw);
        assert!(gate.redeem(&forged).is_err());
    }
}
