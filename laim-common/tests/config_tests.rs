//! Configuration loading and file resolution
//!
//! Tests that touch LAIM_TEST_CONFIG run under #[serial] to avoid
//! environment variable races.

use laim_common::config::{load_or_default, load_toml_config, resolve_config_path, TomlConfig};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::Path;

#[test]
fn test_defaults_without_file() {
    let config = load_or_default(None).unwrap();

    assert_eq!(config.port, 5780);
    assert_eq!(config.logging.level, "info");
    assert!(config.sync.enabled);
    assert_eq!(config.sync.interval_hours, 6);
    assert_eq!(config.sync.priority, vec!["librenms", "netdisco"]);
    assert!(config.sources.netdisco.is_none());
    assert!(config.classifier.rules.is_empty());
    assert!(config.database_path.ends_with("laim.db"));
}

#[test]
fn test_partial_file_fills_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
port = 9000

[sync]
priority = ["netdisco", "librenms"]

[sources.librenms]
base_url = "https://nms.example.org"
api_token = "abc"
max_attempts = 5

[[classifier.rules]]
pattern = "switch"
item_type = "Switch"
"#
    )
    .unwrap();

    let config = load_toml_config(file.path()).unwrap();

    assert_eq!(config.port, 9000);
    assert_eq!(config.sync.priority, vec!["netdisco", "librenms"]);
    assert_eq!(config.sync.interval_hours, 6);

    let librenms = config.sources.librenms.expect("librenms section");
    assert_eq!(librenms.base_url.as_deref(), Some("https://nms.example.org"));
    assert_eq!(librenms.max_attempts, 5);
    assert_eq!(librenms.requests_per_second, 10.0);
    assert!(librenms.verify_tls);

    assert_eq!(config.classifier.rules.len(), 1);
    assert_eq!(config.classifier.rules[0].item_type, "Switch");
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "port = \"not a number\"").unwrap();

    let err = load_toml_config(file.path()).unwrap_err();
    assert!(matches!(err, laim_common::Error::Config(_)));
}

#[test]
#[serial]
fn test_cli_argument_beats_environment() {
    env::set_var("LAIM_TEST_CONFIG", "/tmp/from-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), "LAIM_TEST_CONFIG", "laim-test");
    assert_eq!(resolved.as_deref(), Some(Path::new("/tmp/from-cli.toml")));

    env::remove_var("LAIM_TEST_CONFIG");
}

#[test]
#[serial]
fn test_environment_used_without_cli_argument() {
    env::set_var("LAIM_TEST_CONFIG", "/tmp/from-env.toml");

    let resolved = resolve_config_path(None, "LAIM_TEST_CONFIG", "laim-test");
    assert_eq!(resolved.as_deref(), Some(Path::new("/tmp/from-env.toml")));

    env::remove_var("LAIM_TEST_CONFIG");
}

#[test]
fn test_default_round_trips_through_toml() {
    let config = TomlConfig::default();
    let text = toml::to_string(&config).unwrap();
    let parsed: TomlConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed.port, config.port);
    assert_eq!(parsed.sync.priority, config.sync.priority);
}
