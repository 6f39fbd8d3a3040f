//! Configuration management
//!
//! Handles loading of the JSON configuration file and of API credentials.
//! Every setting has a default, so running without a config file is fine;
//! credentials however are mandatory and a missing one stops startup.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::alerts::TELEGRAM_API_BASE;
use crate::error::ConfigError;
use crate::exchange::{ClientConfig, Credentials, RetryPolicy, VenueKind};
use crate::monitor::DEFAULT_FAILURE_THRESHOLD;

pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHAT_VAR: &str = "TELEGRAM_CHAT_ID";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
}

impl MonitorConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// Exchange connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub venue: VenueKind,
    /// Overrides the venue's public base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Credentials file used for keys missing from the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub min_request_interval_ms: u64,
    pub transient_retry_delay_secs: u64,
    pub default_retry_after_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        ExchangeSettings {
            venue: VenueKind::Kucoin,
            base_url: None,
            credentials_file: None,
            request_timeout_secs: 10,
            max_retries: 3,
            min_request_interval_ms: 100,
            transient_retry_delay_secs: 2,
            default_retry_after_secs: 60,
        }
    }
}

impl ExchangeSettings {
    pub fn client_config(&self) -> ClientConfig {
        let retry = RetryPolicy::default()
            .with_max_retries(self.max_retries)
            .with_transient_delay(Duration::from_secs(self.transient_retry_delay_secs))
            .with_default_retry_after(Duration::from_secs(self.default_retry_after_secs));

        ClientConfig::default()
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_min_request_interval(Duration::from_millis(self.min_request_interval_ms))
            .with_retry_policy(retry)
    }

    /// Credentials file to fall back to
    pub fn credentials_path(&self) -> String {
        self.credentials_file
            .clone()
            .unwrap_or_else(|| self.venue.credentials_file().to_string())
    }
}

/// Polling loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_secs: u64,
    pub failure_threshold: u32,
    /// Symbols reported by the `check` command
    pub pairs: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            poll_interval_secs: 60,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            pairs: vec!["BTC-USDT".to_string()],
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Alert delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// When false, alerts are only written to the log
    pub enabled: bool,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            enabled: true,
            api_base: TELEGRAM_API_BASE.to_string(),
            timeout_secs: 5,
        }
    }
}

/// One required credential and where it may come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialKey {
    /// Field name used in errors
    pub field: &'static str,
    /// Environment variable, also the key in the credentials file
    pub var: String,
}

/// Where a credential value was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    Environment,
    File,
    Missing,
}

/// Required credential keys for a venue, in a fixed order
pub fn credential_keys(venue: VenueKind) -> Vec<CredentialKey> {
    let prefix = venue.env_prefix();
    let mut keys = vec![
        CredentialKey {
            field: "api_key",
            var: format!("{}_API_KEY", prefix),
        },
        CredentialKey {
            field: "api_secret",
            var: format!("{}_API_SECRET", prefix),
        },
    ];
    if venue.requires_passphrase() {
        keys.push(CredentialKey {
            field: "api_passphrase",
            var: format!("{}_API_PASSPHRASE", prefix),
        });
    }
    keys.push(CredentialKey {
        field: "alert_token",
        var: TELEGRAM_TOKEN_VAR.to_string(),
    });
    keys.push(CredentialKey {
        field: "alert_channel",
        var: TELEGRAM_CHAT_VAR.to_string(),
    });
    keys
}

/// Read a credentials file into key/value strings. Numbers (chat ids) are
/// accepted and stringified.
pub fn read_credentials_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let raw: HashMap<String, Value> =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;

    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Number(n) => Some((k, n.to_string())),
            _ => None,
        })
        .collect())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Look up one credential: environment first, then the file
pub fn lookup_credential<F>(
    key: &CredentialKey,
    env: &F,
    file: Option<&HashMap<String, String>>,
) -> (Option<String>, CredentialOrigin)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = non_blank(env(&key.var)) {
        return (Some(value), CredentialOrigin::Environment);
    }
    if let Some(value) = non_blank(file.and_then(|f| f.get(&key.var).cloned())) {
        return (Some(value), CredentialOrigin::File);
    }
    (None, CredentialOrigin::Missing)
}

/// Resolve all credentials for `venue`. Any missing or blank key is an error.
pub fn resolve_credentials<F>(
    venue: VenueKind,
    env: F,
    file: Option<&HashMap<String, String>>,
) -> Result<Credentials, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut values: HashMap<&'static str, String> = HashMap::new();
    for key in credential_keys(venue) {
        match lookup_credential(&key, &env, file) {
            (Some(value), _) => {
                values.insert(key.field, value);
            }
            (None, _) => return Err(ConfigError::MissingCredential(key.field)),
        }
    }

    let mut take = |field: &'static str| values.remove(field).unwrap_or_default();
    Ok(Credentials::new(
        take("api_key"),
        take("api_secret"),
        take("api_passphrase"),
        take("alert_token"),
        take("alert_channel"),
    ))
}

/// Load credentials from the process environment, falling back to the
/// credentials file when it exists.
pub fn load_credentials(settings: &ExchangeSettings) -> Result<Credentials, ConfigError> {
    let path = settings.credentials_path();
    let file = if Path::new(&path).exists() {
        Some(read_credentials_file(&path)?)
    } else {
        None
    };
    resolve_credentials(settings.venue, |var| std::env::var(var).ok(), file.as_ref())
}
