//! Admin credentials and bearer sessions.
//!
//! Passwords are stored as Argon2 PHC strings. Login hands out an opaque
//! random token; the claims it stands for live in memory until they expire,
//! so a restart signs every admin out.

use std::time::Duration;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};
use ulid::Ulid;

use crate::dates::now_ms;
use crate::engine::EngineError;
use crate::limits::MAX_PASSWORD_LEN;
use crate::model::{Admin, Ms};
use crate::observability;

/// Bearer token prefix.
pub const TOKEN_PREFIX: &str = "cr_";

/// Number of random bytes encoded in a token.
pub const TOKEN_SECRET_BYTES: usize = 32;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub admin_id: Ulid,
    pub is_admin: bool,
    pub expires_at: Ms,
}

pub fn hash_password(password: &str) -> Result<String, EngineError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(EngineError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(EngineError::LimitExceeded("password too long"));
    }

    let mut salt = [0_u8; 16];
    OsRng.fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| EngineError::Internal(format!("salt encoding failed: {e}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| EngineError::Internal(format!("password hashing failed: {e}")))
}

/// False for a wrong password and for a hash that does not parse.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn encode_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        encoded.push(HEX[(byte >> 4) as usize] as char);
        encoded.push(HEX[(byte & 0x0f) as usize] as char);
    }
    encoded
}

/// In-memory session table: token → claims.
pub struct Authenticator {
    sessions: DashMap<String, Claims>,
    ttl_ms: Ms,
}

impl Authenticator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl_ms: ttl.as_millis() as Ms,
        }
    }

    pub fn issue(&self, admin: &Admin) -> String {
        self.issue_at(admin, now_ms())
    }

    fn issue_at(&self, admin: &Admin, now: Ms) -> String {
        let mut secret = [0_u8; TOKEN_SECRET_BYTES];
        OsRng.fill_bytes(&mut secret);
        let token = format!("{TOKEN_PREFIX}{}", encode_hex(&secret));

        self.sessions.insert(
            token.clone(),
            Claims {
                admin_id: admin.id,
                is_admin: true,
                expires_at: now.saturating_add(self.ttl_ms),
            },
        );
        metrics::gauge!(observability::SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        token
    }

    pub fn verify(&self, token: &str) -> Result<Claims, EngineError> {
        self.verify_at(token, now_ms())
    }

    fn verify_at(&self, token: &str, now: Ms) -> Result<Claims, EngineError> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(EngineError::Unauthorized("Not authorized"));
        }
        let claims = self
            .sessions
            .get(token)
            .map(|e| e.value().clone())
            .ok_or(EngineError::Unauthorized("Not authorized"))?;
        if claims.expires_at <= now {
            self.sessions.remove(token);
            return Err(EngineError::Unauthorized("Not authorized"));
        }
        if !claims.is_admin {
            return Err(EngineError::Unauthorized("Not authorized as admin"));
        }
        Ok(claims)
    }

    /// Drop expired sessions; returns how many were removed.
    pub fn purge_expired(&self, now: Ms) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, claims| claims.expires_at > now);
        let removed = before.saturating_sub(self.sessions.len());
        metrics::gauge!(observability::SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
