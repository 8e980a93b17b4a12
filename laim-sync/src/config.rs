//! Typed configuration for laim-sync
//!
//! Resolves the raw [`TomlConfig`] plus environment overrides into the
//! settings the engine consumes. Priority: ENV → TOML → built-in default.
//!
//! | Variable              | Overrides                        |
//! |-----------------------|----------------------------------|
//! | `NETDISCO_API_URL`    | `[sources.netdisco] base_url`    |
//! | `NETDISCO_USERNAME`   | `[sources.netdisco] username`    |
//! | `NETDISCO_PASSWORD`   | `[sources.netdisco] password`    |
//! | `LIBRENMS_API_URL`    | `[sources.librenms] base_url`    |
//! | `LIBRENMS_API_TOKEN`  | `[sources.librenms] api_token`   |
//! | `SYNC_ENABLED`        | `[sync] enabled`                 |
//! | `SYNC_INTERVAL_HOURS` | `[sync] interval_hours`          |

use laim_common::config::{SourceSection, TomlConfig};
use laim_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{ItemType, SourceKind};
use crate::services::{Classifier, ClassifierRule};
use crate::sources::{Credentials, RetryPolicy, TransportSettings};

/// One year
const MAX_INTERVAL_HOURS: u64 = 24 * 365;

/// One configured source
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub transport: TransportSettings,
    pub credentials: Credentials,
}

/// Interval trigger settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub interval: Duration,
}

/// Resolved engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Merge priority, highest first
    pub priority: Vec<SourceKind>,
    pub classifier: Classifier,
    /// Only sources with a base URL and non-blank credentials
    pub sources: Vec<SourceConfig>,
    pub trigger: TriggerConfig,
    pub max_record_errors_logged: usize,
}

impl SyncConfig {
    /// Resolve against the process environment
    pub fn from_toml(toml: &TomlConfig) -> Result<Self> {
        Self::resolve(toml, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit variable lookup
    pub fn resolve<F>(toml: &TomlConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let priority = parse_priority(&toml.sync.priority)?;
        let classifier = parse_classifier(toml)?;

        let mut sources = Vec::new();
        for kind in SourceKind::ALL {
            let section = match kind {
                SourceKind::Netdisco => toml.sources.netdisco.clone(),
                SourceKind::Librenms => toml.sources.librenms.clone(),
            }
            .unwrap_or_default();

            match resolve_source(kind, &section, &env) {
                Some(source) => {
                    info!(source = %kind, base_url = %source.transport.base_url, "Source configured");
                    sources.push(source);
                }
                None => info!(source = %kind, "Source not configured"),
            }
        }

        let enabled = match env("SYNC_ENABLED") {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| Error::Config(format!("SYNC_ENABLED: not a boolean: {}", value)))?,
            None => toml.sync.enabled,
        };

        let interval_hours = match env("SYNC_INTERVAL_HOURS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("SYNC_INTERVAL_HOURS: {}", e)))?,
            None => toml.sync.interval_hours,
        };
        if enabled && !(1..=MAX_INTERVAL_HOURS).contains(&interval_hours) {
            return Err(Error::Config(format!(
                "sync interval_hours must be between 1 and {}, got {}",
                MAX_INTERVAL_HOURS, interval_hours
            )));
        }

        Ok(Self {
            priority,
            classifier,
            sources,
            trigger: TriggerConfig {
                enabled,
                interval: Duration::from_secs(interval_hours.min(MAX_INTERVAL_HOURS) * 3600),
            },
            max_record_errors_logged: toml.sync.max_record_errors_logged,
        })
    }
}

fn resolve_source<F>(kind: SourceKind, section: &SourceSection, env: &F) -> Option<SourceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let toml_value = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());

    let (url_var, base_url, credentials) = match kind {
        SourceKind::Netdisco => {
            let username = env("NETDISCO_USERNAME").or_else(|| toml_value(&section.username));
            let password = env("NETDISCO_PASSWORD").or_else(|| toml_value(&section.password));
            let credentials = match (username, password) {
                (Some(username), Some(password)) => Some(Credentials::UserPassword { username, password }),
                _ => None,
            };
            ("NETDISCO_API_URL", &section.base_url, credentials)
        }
        SourceKind::Librenms => {
            let token = env("LIBRENMS_API_TOKEN").or_else(|| toml_value(&section.api_token));
            ("LIBRENMS_API_URL", &section.base_url, token.map(Credentials::ApiToken))
        }
    };

    let base_url = env(url_var).or_else(|| toml_value(base_url))?;
    let credentials = match credentials {
        Some(credentials) => credentials,
        None => {
            warn!(source = %kind, "Base URL set but credentials missing");
            return None;
        }
    };

    Some(SourceConfig {
        kind,
        transport: TransportSettings {
            base_url: base_url.trim().to_string(),
            requests_per_second: section.requests_per_second,
            retry: RetryPolicy {
                max_attempts: section.max_attempts.max(1),
                initial_backoff: Duration::from_millis(section.initial_backoff_ms),
            },
            timeout: Duration::from_secs(section.timeout_secs.max(1)),
            verify_tls: section.verify_tls,
        },
        credentials,
    })
}

fn parse_priority(names: &[String]) -> Result<Vec<SourceKind>> {
    let mut priority = Vec::with_capacity(names.len());
    for name in names {
        let kind: SourceKind = name
            .parse()
            .map_err(|e| Error::Config(format!("[sync] priority: {}", e)))?;
        if !priority.contains(&kind) {
            priority.push(kind);
        }
    }
    Ok(priority)
}

fn parse_classifier(toml: &TomlConfig) -> Result<Classifier> {
    if toml.classifier.rules.is_empty() {
        return Ok(Classifier::default());
    }

    let rules = toml
        .classifier
        .rules
        .iter()
        .map(|entry| {
            entry
                .item_type
                .parse::<ItemType>()
                .map(|item_type| ClassifierRule::new(&entry.pattern, item_type))
                .map_err(|e| Error::Config(format!("[[classifier.rules]] {}: {}", entry.pattern, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Classifier::new(rules))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laim_common::config::ClassifierRuleEntry;
    use serial_test::serial;
    use std::collections::HashMap;

    fn source(config: &SyncConfig, kind: SourceKind) -> Option<&SourceConfig> {
        config.sources.iter().find(|s| s.kind == kind)
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_configure_nothing() {
        let config = SyncConfig::resolve(&TomlConfig::default(), lookup(&[])).unwrap();
        assert!(config.sources.is_empty());
        assert_eq!(config.priority, vec![SourceKind::Librenms, SourceKind::Netdisco]);
        assert!(config.trigger.enabled);
        assert_eq!(config.trigger.interval, Duration::from_secs(6 * 3600));
        assert!(!config.classifier.rules().is_empty());
    }

    #[test]
    fn test_env_overrides_toml() {
        let mut toml = TomlConfig::default();
        toml.sources.librenms = Some(SourceSection {
            base_url: Some("https://toml.example".into()),
            api_token: Some("toml-token".into()),
            ..Default::default()
        });

        let config = SyncConfig::resolve(
            &toml,
            lookup(&[
                ("LIBRENMS_API_URL", "https://env.example"),
                ("SYNC_ENABLED", "false"),
                ("SYNC_INTERVAL_HOURS", "2"),
            ]),
        )
        .unwrap();

        let librenms = source(&config, SourceKind::Librenms).unwrap();
        assert_eq!(librenms.transport.base_url, "https://env.example");
        assert_eq!(librenms.credentials, Credentials::ApiToken("toml-token".into()));
        assert!(!config.trigger.enabled);
        assert_eq!(config.trigger.interval, Duration::from_secs(2 * 3600));
    }

    #[test]
    fn test_interval_hours_bounds() {
        let huge = u64::MAX.to_string();
        for value in ["0", huge.as_str(), "8761"] {
            assert!(
                matches!(
                    SyncConfig::resolve(&TomlConfig::default(), lookup(&[("SYNC_INTERVAL_HOURS", value)])),
                    Err(Error::Config(_))
                ),
                "{}",
                value
            );
        }

        let config =
            SyncConfig::resolve(&TomlConfig::default(), lookup(&[("SYNC_INTERVAL_HOURS", "8760")])).unwrap();
        assert_eq!(config.trigger.interval, Duration::from_secs(8760 * 3600));
    }

    #[test]
    fn test_blank_credentials_leave_source_unconfigured() {
        let config = SyncConfig::resolve(
            &TomlConfig::default(),
            lookup(&[
                ("NETDISCO_API_URL", "https://nd.example"),
                ("NETDISCO_USERNAME", "svc"),
                ("NETDISCO_PASSWORD", "  "),
            ]),
        )
        .unwrap();
        assert!(source(&config, SourceKind::Netdisco).is_none());
    }

    #[test]
    fn test_unknown_priority_name_is_config_error() {
        let mut toml = TomlConfig::default();
        toml.sync.priority = vec!["observium".into()];
        assert!(matches!(
            SyncConfig::resolve(&toml, lookup(&[])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_classifier_rules_from_toml() {
        let mut toml = TomlConfig::default();
        toml.classifier.rules = vec![
            ClassifierRuleEntry {
                pattern: "C9300".into(),
                item_type: "Switch".into(),
            },
            ClassifierRuleEntry {
                pattern: "mx".into(),
                item_type: "router".into(),
            },
        ];

        let config = SyncConfig::resolve(&toml, lookup(&[])).unwrap();
        assert_eq!(config.classifier.rules().len(), 2);
        assert_eq!(config.classifier.rules()[1].item_type, ItemType::Firewall);

        toml.classifier.rules[0].item_type = "toaster".into();
        assert!(SyncConfig::resolve(&toml, lookup(&[])).is_err());
    }

    #[test]
    #[serial]
    fn test_process_environment_is_read() {
        std::env::set_var("NETDISCO_API_URL", "https://nd.example");
        std::env::set_var("NETDISCO_USERNAME", "svc");
        std::env::set_var("NETDISCO_PASSWORD", "secret");

        let config = SyncConfig::from_toml(&TomlConfig::default());

        std::env::remove_var("NETDISCO_API_URL");
        std::env::remove_var("NETDISCO_USERNAME");
        std::env::remove_var("NETDISCO_PASSWORD");

        let config = config.unwrap();
        let netdisco = source(&config, SourceKind::Netdisco).unwrap();
        assert_eq!(netdisco.transport.retry.max_attempts, 3);
        assert_eq!(netdisco.transport.requests_per_second, 10.0);
    }
}
