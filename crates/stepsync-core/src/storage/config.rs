//! TOML-based application configuration.
//!
//! Holds:
//! - Transport timeouts and retry budget
//! - Login rate-limit policy and session renewal
//! - Step randomization ranges
//! - Session directory, notifier and network probe settings
//! - Remote endpoint overrides
//! - The account list
//!
//! Configuration is stored at `~/.config/stepsync/config.toml`. When the file
//! lists no accounts they are read from the environment instead
//! (`ZEPP_USER`, `ZEPP_PWD`, `ZEPP_STEPS`, `DEVICE_ID`, `PROXY`; multiple
//! accounts are `#`-separated and paired by position).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::account::{Account, DEFAULT_BASELINE, DEFAULT_DEVICE_ID};
use crate::auth::LoginConfig;
use crate::endpoints::Endpoints;
use crate::error::ConfigError;
use crate::notify::DEFAULT_TITLE;
use crate::steps::StepConfig;
use crate::transport::HttpConfig;

const ENV_SEPARATOR: char = '#';

/// Where session records live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `<data_dir>/sessions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
}

/// Summary delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_title")]
    pub title: String,
}

/// Pre-run DNS probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub dns_probe: bool,
    #[serde(default = "default_probe_host")]
    pub probe_host: String,
}

/// One `[[accounts]]` entry as written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub user: String,
    pub password: String,
    #[serde(default = "default_baseline")]
    pub baseline: u32,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub proxy: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/stepsync/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub steps: StepConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

/// An entry that was dropped, with its position in the source list.
#[derive(Debug)]
pub struct RejectedAccount {
    pub index: usize,
    pub error: ConfigError,
}

/// Validated accounts plus the entries that were skipped.
#[derive(Debug, Default)]
pub struct AccountSet {
    pub accounts: Vec<Account>,
    pub rejected: Vec<RejectedAccount>,
}

// Default functions
fn default_title() -> String {
    DEFAULT_TITLE.into()
}
fn default_true() -> bool {
    true
}
fn default_probe_host() -> String {
    "api-user.huami.com".into()
}
fn default_baseline() -> u32 {
    DEFAULT_BASELINE
}
fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.into()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            title: default_title(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            dns_probe: true,
            probe_host: default_probe_host(),
        }
    }
}

impl AccountEntry {
    fn validate(&self) -> Result<Account, ConfigError> {
        Account::new(
            &self.user,
            &self.password,
            self.baseline,
            &self.device_id,
            Some(self.proxy.as_str()),
        )
    }
}

fn split_env(value: &str) -> Vec<&str> {
    value.split(ENV_SEPARATOR).map(str::trim).collect()
}

fn nth_or_first<'a>(parts: &[&'a str], index: usize) -> Option<&'a str> {
    parts.get(index).or_else(|| parts.first()).copied()
}

impl Config {
    /// Default location of the config file.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Parse TOML text and validate it.
    ///
    /// # Errors
    /// `ParseFailed` for malformed TOML, `InvalidValue` for bad endpoint URLs.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        cfg.endpoints.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, or defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Load from the default location.
    ///
    /// # Errors
    /// See [`Config::load_from`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// A starter config with one placeholder account.
    pub fn template() -> Self {
        Self {
            accounts: vec![AccountEntry {
                user: "13800138000".into(),
                password: "change-me".into(),
                baseline: DEFAULT_BASELINE,
                device_id: DEFAULT_DEVICE_ID.into(),
                proxy: String::new(),
            }],
            ..Self::default()
        }
    }

    /// Copy with every password replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        for entry in &mut cfg.accounts {
            entry.password = "********".into();
        }
        cfg
    }

    /// Session directory, falling back to `<data_dir>/sessions`.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn session_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.session_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("sessions")),
        }
    }

    /// Account entries parsed from environment-style variables.
    pub fn accounts_from_env<F>(lookup: F) -> Vec<AccountEntry>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();
        let users = var("ZEPP_USER");
        if users.trim().is_empty() {
            return Vec::new();
        }
        let passwords = var("ZEPP_PWD");
        let steps = var("ZEPP_STEPS");
        let devices = var("DEVICE_ID");
        let proxies = var("PROXY");

        let passwords = split_env(&passwords);
        let steps = split_env(&steps);
        let devices = split_env(&devices);
        let proxies = split_env(&proxies);

        users
            .split(ENV_SEPARATOR)
            .map(str::trim)
            .enumerate()
            .map(|(i, user)| AccountEntry {
                user: user.to_string(),
                // passwords pair strictly by position
                password: passwords.get(i).copied().unwrap_or_default().to_string(),
                baseline: nth_or_first(&steps, i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BASELINE),
                device_id: nth_or_first(&devices, i)
                    .filter(|d| !d.is_empty())
                    .unwrap_or(DEFAULT_DEVICE_ID)
                    .to_string(),
                proxy: nth_or_first(&proxies, i).unwrap_or_default().to_string(),
            })
            .collect()
    }

    /// Validate account entries, taking them from `lookup` when the file has none.
    ///
    /// Invalid entries are logged and returned in `rejected`.
    pub fn accounts_with_env<F>(&self, lookup: F) -> AccountSet
    where
        F: Fn(&str) -> Option<String>,
    {
        let entries = if self.accounts.is_empty() {
            Self::accounts_from_env(lookup)
        } else {
            self.accounts.clone()
        };

        let mut set = AccountSet::default();
        for (index, entry) in entries.iter().enumerate() {
            match entry.validate() {
                Ok(account) => set.accounts.push(account),
                Err(error) => {
                    tracing::warn!(index, %error, "skipping account entry");
                    set.rejected.push(RejectedAccount { index, error });
                }
            }
        }
        set
    }

    /// [`accounts_with_env`](Self::accounts_with_env) against the process environment.
    pub fn accounts(&self) -> AccountSet {
        self.accounts_with_env(|key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::template();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed = Config::parse(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.http.connect_timeout_secs, 10);
        assert_eq!(cfg.http.read_timeout_secs, 30);
        assert_eq!(cfg.http.max_retries, 3);
        assert_eq!(cfg.login.max_rate_limit_retries, 2);
        assert!(cfg.login.refresh_cached);
        assert_eq!(cfg.steps.baseline_range, 0);
        assert_eq!(cfg.steps.final_range, 2000);
        assert_eq!(cfg.notify.title, "Zepp step sync");
        assert!(cfg.network.dns_probe);
        assert!(cfg.accounts.is_empty());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg = Config::parse(
            r#"
            [steps]
            baseline_range = 3000

            [[accounts]]
            user = "a@example.com"
            password = "pw"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.steps.baseline_range, 3000);
        assert_eq!(cfg.steps.final_range, 2000);
        assert_eq!(cfg.accounts[0].baseline, DEFAULT_BASELINE);
        assert_eq!(cfg.accounts[0].device_id, DEFAULT_DEVICE_ID);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            Config::parse("[[accounts]\nuser ="),
            Err(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn bad_endpoint_rejected() {
        let err = Config::parse("[endpoints]\ndata_api = \"nope\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_file_gives_defaults_and_save_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        Config::template().save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::template());
    }

    #[test]
    fn invalid_entries_are_skipped_not_fatal() {
        let mut cfg = Config::template();
        cfg.accounts.push(AccountEntry {
            user: "not-an-account".into(),
            password: "pw".into(),
            baseline: 1,
            device_id: String::new(),
            proxy: String::new(),
        });
        let set = cfg.accounts_with_env(env(&[]));
        assert_eq!(set.accounts.len(), 1);
        assert_eq!(set.accounts[0].user, "+8613800138000");
        assert_eq!(set.rejected.len(), 1);
        assert_eq!(set.rejected[0].index, 1);
    }

    #[test]
    fn env_accounts_pair_by_position() {
        let entries = Config::accounts_from_env(env(&[
            ("ZEPP_USER", "13800138000#a@example.com"),
            ("ZEPP_PWD", "p1#p2"),
            ("ZEPP_STEPS", "30000"),
            ("PROXY", "#http://127.0.0.1:8080"),
        ]));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].user, "a@example.com");
        assert_eq!(entries[1].password, "p2");
        assert_eq!(entries[1].baseline, 30_000);
        assert_eq!(entries[0].proxy, "");
        assert_eq!(entries[1].proxy, "http://127.0.0.1:8080");
        assert_eq!(entries[0].device_id, DEFAULT_DEVICE_ID);
    }

    #[test]
    fn env_user_without_password_is_rejected() {
        let cfg = Config::default();
        let set = cfg.accounts_with_env(env(&[
            ("ZEPP_USER", "13800138000#13900139000"),
            ("ZEPP_PWD", "p1"),
        ]));
        assert_eq!(set.accounts.len(), 1);
        assert_eq!(set.rejected.len(), 1);
    }

    #[test]
    fn file_accounts_take_precedence_over_env() {
        let set = Config::template().accounts_with_env(env(&[
            ("ZEPP_USER", "a@example.com"),
            ("ZEPP_PWD", "pw"),
        ]));
        assert_eq!(set.accounts.len(), 1);
        assert_eq!(set.accounts[0].user, "+8613800138000");
    }

    #[test]
    fn no_env_no_accounts() {
        assert!(Config::accounts_from_env(env(&[])).is_empty());
    }

    #[test]
    fn redacted_hides_passwords() {
        let shown = toml::to_string_pretty(&Config::template().redacted()).unwrap();
        assert!(!shown.contains("change-me"));
        assert!(shown.contains("********"));
    }
}
