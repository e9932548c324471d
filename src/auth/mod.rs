//! Authentication Module
//!
//! HTTP basic authentication for the share and private scopes. Users come
//! from the `[auth]` config section with either a plaintext password or an
//! argon2 PHC hash.

use std::fmt;

use ahash::AHashMap;
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use base64::Engine;
use tracing::{debug, warn};

use crate::config::AuthConfig;

#[cfg(test)]
mod tests;

/// Why a request could not be authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header
    Missing,
    /// Header present but not `Basic base64(user:pass)`
    Malformed,
    /// Unknown user or wrong password
    InvalidCredentials,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Missing => write!(f, "missing authorization"),
            AuthError::Malformed => write!(f, "malformed authorization header"),
            AuthError::InvalidCredentials => write!(f, "invalid credentials"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Stored credential of a user
enum Credential {
    Plain(String),
    /// argon2 PHC string
    Hash(String),
}

/// Authentication provider
pub struct AuthProvider {
    users: AHashMap<String, Credential>,
}

impl AuthProvider {
    /// Create a new auth provider from configuration
    pub fn new(config: &AuthConfig) -> Self {
        let mut users = AHashMap::new();

        for user in &config.users {
            let credential = match (&user.password, &user.password_hash) {
                (_, Some(hash)) => Credential::Hash(hash.clone()),
                (Some(password), None) => Credential::Plain(password.clone()),
                (None, None) => {
                    warn!("User '{}' has no credentials, skipping", user.username);
                    continue;
                }
            };
            users.insert(user.username.clone(), credential);
        }

        Self { users }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Check a username/password pair
    pub fn verify(&self, username: &str, password: &[u8]) -> bool {
        match self.users.get(username) {
            Some(Credential::Plain(stored)) => stored.as_bytes() == password,
            Some(Credential::Hash(hash)) => verify_password_hash(password, hash),
            None => false,
        }
    }

    /// Authenticate an `Authorization` header value, returning the username
    pub fn authenticate_basic(&self, header: Option<&str>) -> Result<String, AuthError> {
        let header = header.ok_or(AuthError::Missing)?;
        let (username, password) = parse_basic(header)?;

        if self.verify(&username, password.as_bytes()) {
            Ok(username)
        } else {
            debug!("Rejected credentials for user '{}'", username);
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Verify a password against an argon2 PHC hash
fn verify_password_hash(password: &[u8], hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password, &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Invalid password hash: {}", e);
            false
        }
    }
}

/// Split a `Basic` header value into username and password
pub fn parse_basic(header: &str) -> Result<(String, String), AuthError> {
    let (scheme, encoded) = header.trim().split_once(' ').ok_or(AuthError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::Malformed);
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::Malformed)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;
    let (username, password) = decoded.split_once(':').ok_or(AuthError::Malformed)?;

    Ok((username.to_string(), password.to_string()))
}
