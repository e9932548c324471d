//! Config module tests

use super::*;
use std::io::Write;

#[test]
fn test_substitute_env_vars_simple() {
    std::env::set_var("MSGHUB_TEST_VAR_SIMPLE", "hello");
    let result = substitute_env_vars("value = \"${MSGHUB_TEST_VAR_SIMPLE}\"").unwrap();
    assert_eq!(result, "value = \"hello\"");
    std::env::remove_var("MSGHUB_TEST_VAR_SIMPLE");
}

#[test]
fn test_substitute_env_vars_with_default() {
    // Unset var should use default
    std::env::remove_var("MSGHUB_TEST_VAR_UNSET");
    let result = substitute_env_vars("value = \"${MSGHUB_TEST_VAR_UNSET:-fallback}\"").unwrap();
    assert_eq!(result, "value = \"fallback\"");

    // Set var should use env value
    std::env::set_var("MSGHUB_TEST_VAR_SET", "env_value");
    let result = substitute_env_vars("value = \"${MSGHUB_TEST_VAR_SET:-fallback}\"").unwrap();
    assert_eq!(result, "value = \"env_value\"");
    std::env::remove_var("MSGHUB_TEST_VAR_SET");
}

#[test]
fn test_substitute_env_vars_missing_no_default() {
    std::env::remove_var("MSGHUB_TEST_VAR_MISSING");
    let result = substitute_env_vars("value = \"${MSGHUB_TEST_VAR_MISSING}\"").unwrap();
    assert_eq!(result, "value = \"\"");
}

#[test]
fn test_load_config_with_env_substitution() {
    std::env::set_var("MSGHUB_TEST_BIND_HOST", "127.0.0.1");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[server]
bind = "${{MSGHUB_TEST_BIND_HOST}}:${{MSGHUB_TEST_BIND_PORT:-8181}}"

[hub]
write_timeout = "250ms"
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.server.bind.to_string(), "127.0.0.1:8181");
    assert_eq!(config.hub.write_timeout, Duration::from_millis(250));
    assert_eq!(config.hub.replay_capacity, replay::DEFAULT_CAPACITY);

    std::env::remove_var("MSGHUB_TEST_BIND_HOST");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.server.bind.port(), 8080);
    assert_eq!(config.hub.default_drain_amount, 10);
    assert_eq!(config.hub.global_topic, "global");
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.log.level, "info");
    assert_eq!(config.server.bind.port(), 8080);
    assert!(config.server.ws_bind.is_none());
    assert_eq!(config.server.max_body_size, 1024 * 1024);
    assert_eq!(config.hub.replay_capacity, 1000);
    assert_eq!(config.hub.max_inflight_deliveries, DEFAULT_MAX_INFLIGHT);
    assert_eq!(config.hub.write_timeout, Duration::from_secs(10));
    assert!(config.auth.users.is_empty());
    assert!(!config.metrics.enabled);
}

#[test]
fn test_parse_full_config() {
    let toml = r#"
[log]
level = "debug"

[server]
bind = "127.0.0.1:9000"
ws_bind = "127.0.0.1:9001"
max_body_size = 4096

[hub]
replay_capacity = 50
max_inflight_deliveries = 0
write_timeout = "2s"
default_drain_amount = 5
global_topic = ""

[[auth.users]]
username = "alice"
password = "secret"

[metrics]
enabled = true
"#;

    let config = Config::parse(toml).unwrap();
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.server.ws_bind.unwrap().port(), 9001);
    assert_eq!(config.server.max_body_size, 4096);
    assert_eq!(config.hub.replay_capacity, 50);
    assert_eq!(config.hub.default_drain_amount, 5);
    assert_eq!(config.auth.users[0].username, "alice");
    assert!(config.metrics.enabled);

    let options = config.hub_options();
    assert_eq!(options.replay_capacity, 50);
    assert_eq!(options.max_inflight_deliveries, 0);
    assert_eq!(options.write_timeout, Duration::from_secs(2));
    assert!(options.global_topic.is_empty());
}

#[test]
fn test_zero_replay_capacity_rejected() {
    let result = Config::parse("[hub]\nreplay_capacity = 0\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_zero_drain_amount_rejected() {
    let result = Config::parse("[hub]\ndefault_drain_amount = 0\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_bad_write_timeout_is_parse_error() {
    let result = Config::parse("[hub]\nwrite_timeout = \"soon\"\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_user_missing_password_and_hash() {
    let toml = r#"
[[auth.users]]
username = "alice"
"#;
    let err = Config::parse(toml).unwrap_err();
    assert!(err.to_string().contains("either 'password' or 'password_hash'"));
}

#[test]
fn test_user_both_password_and_hash() {
    let toml = r#"
[[auth.users]]
username = "alice"
password = "secret"
password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"
"#;
    let err = Config::parse(toml).unwrap_err();
    assert!(err.to_string().contains("cannot have both"));
}

#[test]
fn test_user_invalid_hash_format() {
    let toml = r#"
[[auth.users]]
username = "alice"
password_hash = "$2b$12$notargon"
"#;
    let err = Config::parse(toml).unwrap_err();
    assert!(err.to_string().contains("argon2 PHC format"));
}

#[test]
fn test_user_empty_password() {
    let toml = r#"
[[auth.users]]
username = "alice"
password = ""
"#;
    assert!(Config::parse(toml).is_err());
}

#[test]
fn test_duplicate_username_rejected() {
    let toml = r#"
[[auth.users]]
username = "alice"
password = "one"

[[auth.users]]
username = "alice"
password = "two"
"#;
    let err = Config::parse(toml).unwrap_err();
    assert!(err.to_string().contains("more than once"));
}

#[test]
fn test_user_valid_password_hash() {
    let toml = r#"
[[auth.users]]
username = "bob"
password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g"
"#;
    let config = Config::parse(toml).unwrap();
    assert!(config.auth.users[0].password.is_none());
}
