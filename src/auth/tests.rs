//! Auth module tests

use super::*;
use crate::config::{AuthConfig, UserConfig};
use argon2::password_hash::{PasswordHasher, SaltString};

fn make_user_plaintext(username: &str, password: &str) -> UserConfig {
    UserConfig {
        username: username.to_string(),
        password: Some(password.to_string()),
        password_hash: None,
    }
}

fn make_user_hashed(username: &str, password_hash: &str) -> UserConfig {
    UserConfig {
        username: username.to_string(),
        password: None,
        password_hash: Some(password_hash.to_string()),
    }
}

fn provider(users: Vec<UserConfig>) -> AuthProvider {
    AuthProvider::new(&AuthConfig { users })
}

fn basic(credentials: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}

/// Argon2 hash of `password` with default params and a fixed salt
fn hash(password: &str) -> String {
    let salt = SaltString::encode_b64(b"msghub-test-salt").unwrap();
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

#[test]
fn test_parse_basic() {
    let (user, pass) = parse_basic(&basic("alice:s3cr:et")).unwrap();
    assert_eq!(user, "alice");
    // Only the first colon separates
    assert_eq!(pass, "s3cr:et");

    let (user, pass) = parse_basic(&basic("bob:").replace("Basic", "basic")).unwrap();
    assert_eq!(user, "bob");
    assert_eq!(pass, "");
}

#[test]
fn test_parse_basic_malformed() {
    assert_eq!(parse_basic("Basic"), Err(AuthError::Malformed));
    assert_eq!(parse_basic("Bearer abc"), Err(AuthError::Malformed));
    assert_eq!(parse_basic("Basic !!!notbase64"), Err(AuthError::Malformed));
    assert_eq!(parse_basic(&basic("no-colon")), Err(AuthError::Malformed));
}

#[test]
fn test_missing_header() {
    let provider = provider(vec![make_user_plaintext("admin", "secret")]);
    assert_eq!(provider.authenticate_basic(None), Err(AuthError::Missing));
}

#[test]
fn test_plaintext_user() {
    let provider = provider(vec![make_user_plaintext("admin", "secret")]);
    assert_eq!(provider.user_count(), 1);

    assert_eq!(
        provider.authenticate_basic(Some(&basic("admin:secret"))),
        Ok("admin".to_string())
    );
    assert_eq!(
        provider.authenticate_basic(Some(&basic("admin:wrong"))),
        Err(AuthError::InvalidCredentials)
    );
    assert_eq!(
        provider.authenticate_basic(Some(&basic("unknown:secret"))),
        Err(AuthError::InvalidCredentials)
    );
}

#[test]
fn test_password_hash_user() {
    let provider = provider(vec![make_user_hashed("admin", &hash("secret"))]);

    assert!(provider.verify("admin", b"secret"));
    assert!(!provider.verify("admin", b"wrong"));
}

#[test]
fn test_mixed_auth_methods() {
    let provider = provider(vec![
        make_user_plaintext("plain_user", "plainpass"),
        make_user_hashed("hash_user", &hash("secret")),
    ]);

    assert!(provider.verify("plain_user", b"plainpass"));
    assert!(provider.verify("hash_user", b"secret"));
    assert!(!provider.verify("hash_user", b"plainpass"));
}

#[test]
fn test_garbage_hash_rejects() {
    let provider = provider(vec![make_user_hashed("admin", "$argon2id$garbage")]);
    assert!(!provider.verify("admin", b"anything"));
}

#[test]
fn test_user_without_credentials_skipped() {
    let provider = provider(vec![UserConfig {
        username: "ghost".to_string(),
        password: None,
        password_hash: None,
    }]);
    assert_eq!(provider.user_count(), 0);
    assert!(!provider.verify("ghost", b""));
}
