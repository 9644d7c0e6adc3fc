//! Two-step login handshake and session renewal.
//!
//! 1. POST credentials to `/registrations/{identifier}/tokens` and read the
//!    opaque `access` code. A 429 here is honoured by sleeping for
//!    `Retry-After` and trying the step again, up to
//!    `max_rate_limit_retries` extra attempts.
//! 2. Exchange the code at `/v2/client/login` for `token_info`, which carries
//!    the login token, user id and app token.
//!
//! A successful login is persisted through the [`SessionStore`] before it is
//! returned.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::endpoints::Endpoints;
use crate::error::AuthError;
use crate::session::{SessionBundle, SessionStore};
use crate::transport::{ensure_success, read_json, truncate, HttpClient, APP_NAME};

const CLIENT_ID: &str = "HuaMi";
const COUNTRY_CODE: &str = "CN";
const REDIRECT_URI: &str = "https://s3-us-west-2.amazonaws.com/hm-registration/successsignin.html";
const LOGIN_DEVICE_ID: &str = "02:00:00:00:00:00";
const LOGIN_DEVICE_MODEL: &str = "android_phone";
const APP_VERSION: &str = "6.12.0";

/// Login-layer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Extra attempts of step one after a 429.
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    /// Wait used when a 429 carries no usable `Retry-After`.
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
    /// Upper bound on any single `Retry-After` wait.
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
    /// Renew the login token of a still-valid cached session.
    #[serde(default = "default_true")]
    pub refresh_cached: bool,
}

fn default_max_rate_limit_retries() -> u32 {
    2
}
fn default_retry_after_secs() -> u64 {
    60
}
fn default_max_retry_after_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: default_max_rate_limit_retries(),
            default_retry_after_secs: default_retry_after_secs(),
            max_retry_after_secs: default_max_retry_after_secs(),
            refresh_cached: true,
        }
    }
}

impl LoginConfig {
    /// Wait implied by a `Retry-After` header value (seconds only).
    pub fn retry_after(&self, header: Option<&str>) -> Duration {
        let secs = header
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(self.default_retry_after_secs);
        Duration::from_secs(secs.min(self.max_retry_after_secs))
    }
}

/// String or integer JSON field as a string.
fn json_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct Authenticator<'a> {
    client: &'a HttpClient,
    endpoints: &'a Endpoints,
    config: &'a LoginConfig,
    store: &'a SessionStore,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        client: &'a HttpClient,
        endpoints: &'a Endpoints,
        config: &'a LoginConfig,
        store: &'a SessionStore,
    ) -> Self {
        Self {
            client,
            endpoints,
            config,
            store,
        }
    }

    /// Run the full handshake and persist the resulting session.
    ///
    /// # Errors
    /// `AuthError::RateLimited` when 429s outlast the retry cap,
    /// `MissingAccessCode`/`MissingTokenInfo` on unexpected response shapes,
    /// `Http` for transport or status failures, `Store` if saving fails.
    pub async fn login(&self, account: &Account) -> Result<SessionBundle, AuthError> {
        tracing::info!(account = %account.user, "logging in");
        let code = self.request_access_code(account).await?;
        let bundle = self.exchange_code(account, &code).await?;
        self.store.save(&account.user, &bundle)?;
        tracing::info!(account = %account.user, user_id = %bundle.user_id, "login succeeded, session saved");
        Ok(bundle)
    }

    async fn request_access_code(&self, account: &Account) -> Result<String, AuthError> {
        let url = self.endpoints.token_url(&account.user);
        let form = [
            ("client_id", CLIENT_ID),
            ("country_code", COUNTRY_CODE),
            ("json_response", "true"),
            ("name", account.user.as_str()),
            ("password", account.password.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("state", "REDIRECTION"),
            ("token", "access"),
        ];

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            // 429 comes straight back so this loop alone owns the Retry-After wait.
            let resp = self
                .client
                .send_passing(
                    |c| c.post(&url).form(&form),
                    &[StatusCode::TOO_MANY_REQUESTS],
                )
                .await?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempts > self.config.max_rate_limit_retries {
                    return Err(AuthError::RateLimited { attempts });
                }
                let header = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok());
                let wait = self.config.retry_after(header);
                tracing::warn!(
                    account = %account.user,
                    attempt = attempts,
                    wait_secs = wait.as_secs(),
                    "login rate limited, waiting"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let resp = ensure_success(resp).await?;
            let (json, body) = read_json(resp).await?;
            return json_text(&json["access"]).ok_or_else(|| AuthError::MissingAccessCode {
                body: truncate(&body, 300).to_string(),
            });
        }
    }

    async fn exchange_code(&self, account: &Account, code: &str) -> Result<SessionBundle, AuthError> {
        let url = self.endpoints.login_url();
        let form = [
            ("app_name", APP_NAME),
            ("country_code", COUNTRY_CODE),
            ("code", code),
            ("device_id", LOGIN_DEVICE_ID),
            ("device_model", LOGIN_DEVICE_MODEL),
            ("app_version", APP_VERSION),
            ("grant_type", "access_token"),
            ("allow_registration", "false"),
            ("source", APP_NAME),
            ("third_name", account.account_type().third_name()),
        ];

        let resp = self
            .client
            .send_checked(|c| c.post(&url).form(&form))
            .await?;
        let (json, body) = read_json(resp).await?;

        let info = &json["token_info"];
        match (
            json_text(&info["login_token"]),
            json_text(&info["user_id"]),
            json_text(&info["app_token"]),
        ) {
            (Some(login_token), Some(user_id), Some(app_token)) => {
                Ok(SessionBundle::issue(login_token, user_id, app_token))
            }
            _ => Err(AuthError::MissingTokenInfo {
                body: truncate(&body, 300).to_string(),
            }),
        }
    }

    /// Renew the login token of a cached session.
    ///
    /// When the server answers without `token_info` the bundle is returned
    /// untouched and nothing is written.
    pub async fn refresh(
        &self,
        account: &Account,
        mut bundle: SessionBundle,
    ) -> Result<SessionBundle, AuthError> {
        let url = self.endpoints.renew_url();
        let resp = self
            .client
            .send_checked(|c| {
                c.get(&url)
                    .query(&[("login_token", bundle.login_token.as_str())])
            })
            .await?;
        let (json, _) = read_json(resp).await?;

        match json_text(&json["token_info"]["login_token"]) {
            Some(login_token) => {
                bundle.renew(login_token);
                self.store.save(&account.user, &bundle)?;
                tracing::info!(account = %account.user, "session renewed");
            }
            None => {
                tracing::debug!(account = %account.user, "renewal returned no token_info, keeping cached session");
            }
        }
        Ok(bundle)
    }
}
