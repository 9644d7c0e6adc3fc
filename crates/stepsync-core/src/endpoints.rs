//! Remote service locations.
//!
//! Production hosts are the defaults; every base URL can be overridden from
//! the `[endpoints]` config section (mirrors, or a local mock server in tests).

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_USER_API: &str = "https://api-user.huami.com";
pub const DEFAULT_ACCOUNT_API: &str = "https://account.huami.com";
pub const DEFAULT_RENEW_API: &str = "https://account-cn.huami.com";
pub const DEFAULT_DATA_API: &str = "https://api-mifit-cn.huami.com";

pub const DEFAULT_TIMESTAMP_SOURCES: [&str; 2] = [
    "https://api.m.taobao.com/rest/api3.do?api=mtop.common.getTimestamp",
    "http://api.m.taobao.com/rest/api3.do?api=mtop.common.getTimestamp",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_user_api")]
    pub user_api: String,
    #[serde(default = "default_account_api")]
    pub account_api: String,
    #[serde(default = "default_renew_api")]
    pub renew_api: String,
    #[serde(default = "default_data_api")]
    pub data_api: String,
    /// Remote time providers tried in order before the local clock.
    #[serde(default = "default_timestamp_sources")]
    pub timestamp_sources: Vec<String>,
}

fn default_user_api() -> String {
    DEFAULT_USER_API.into()
}
fn default_account_api() -> String {
    DEFAULT_ACCOUNT_API.into()
}
fn default_renew_api() -> String {
    DEFAULT_RENEW_API.into()
}
fn default_data_api() -> String {
    DEFAULT_DATA_API.into()
}
fn default_timestamp_sources() -> Vec<String> {
    DEFAULT_TIMESTAMP_SOURCES.iter().map(|s| s.to_string()).collect()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            user_api: default_user_api(),
            account_api: default_account_api(),
            renew_api: default_renew_api(),
            data_api: default_data_api(),
            timestamp_sources: default_timestamp_sources(),
        }
    }
}

impl Endpoints {
    /// Point every service at one base URL. Used against mock servers.
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            user_api: base.clone(),
            account_api: base.clone(),
            renew_api: base.clone(),
            data_api: base,
            timestamp_sources: Vec::new(),
        }
    }

    /// Check that every configured URL parses.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("endpoints.user_api", &self.user_api),
            ("endpoints.account_api", &self.account_api),
            ("endpoints.renew_api", &self.renew_api),
            ("endpoints.data_api", &self.data_api),
        ];
        let sources = self
            .timestamp_sources
            .iter()
            .map(|s| ("endpoints.timestamp_sources", s));

        for (key, value) in fields.into_iter().chain(sources) {
            Url::parse(value).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{value}': {e}"),
            })?;
        }
        Ok(())
    }

    /// Step one of the login handshake, scoped by identifier.
    pub fn token_url(&self, identifier: &str) -> String {
        format!(
            "{}/registrations/{}/tokens",
            self.user_api.trim_end_matches('/'),
            identifier
        )
    }

    /// Step two of the login handshake.
    pub fn login_url(&self) -> String {
        format!("{}/v2/client/login", self.account_api.trim_end_matches('/'))
    }

    pub fn renew_url(&self) -> String {
        format!(
            "{}/v1/client/renew_login_token",
            self.renew_api.trim_end_matches('/')
        )
    }

    /// Activity submission, stamped with a server-synchronized timestamp.
    pub fn band_data_url(&self, timestamp: &str) -> String {
        format!(
            "{}/v1/data/band_data.json?&t={}",
            self.data_api.trim_end_matches('/'),
            timestamp
        )
    }
}
