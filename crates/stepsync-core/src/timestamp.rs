//! Server-synchronized epoch-millisecond timestamps.
//!
//! The submission endpoint checks request freshness against a `t` query
//! parameter, so the value comes from a remote time provider when one
//! answers and from the local clock otherwise.

use chrono::Utc;

use crate::endpoints::Endpoints;
use crate::error::HttpError;
use crate::transport::{read_json, HttpClient};

/// One entry in the provider chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampProvider {
    /// A JSON endpoint exposing epoch milliseconds at `data.t`.
    Remote { url: String },
    /// The local wall clock. Never fails.
    LocalClock,
}

impl TimestampProvider {
    async fn fetch(&self, client: &HttpClient) -> Result<String, HttpError> {
        match self {
            TimestampProvider::LocalClock => Ok(local_millis()),
            TimestampProvider::Remote { url } => {
                let resp = client.send_checked(|c| c.get(url)).await?;
                let (json, body) = read_json(resp).await?;
                parse_millis(&json["data"]["t"])
                    .ok_or_else(|| HttpError::Decode(format!("no data.t in {body}")))
            }
        }
    }
}

/// Ordered provider chain with a local-clock floor.
#[derive(Debug, Clone)]
pub struct TimestampSource {
    providers: Vec<TimestampProvider>,
}

impl TimestampSource {
    pub fn new(providers: Vec<TimestampProvider>) -> Self {
        Self { providers }
    }

    /// Remote sources from the endpoint config, then the local clock.
    pub fn from_endpoints(endpoints: &Endpoints) -> Self {
        let mut providers: Vec<TimestampProvider> = endpoints
            .timestamp_sources
            .iter()
            .map(|url| TimestampProvider::Remote { url: url.clone() })
            .collect();
        providers.push(TimestampProvider::LocalClock);
        Self { providers }
    }

    pub fn providers(&self) -> &[TimestampProvider] {
        &self.providers
    }

    /// First provider that yields a numeric millisecond string wins.
    pub async fn get_timestamp(&self, client: &HttpClient) -> String {
        for provider in &self.providers {
            match provider.fetch(client).await {
                Ok(ts) => {
                    tracing::debug!(?provider, timestamp = %ts, "timestamp resolved");
                    return ts;
                }
                Err(e) => {
                    tracing::debug!(?provider, error = %e, "timestamp provider failed");
                }
            }
        }
        local_millis()
    }
}

impl Default for TimestampSource {
    fn default() -> Self {
        Self::from_endpoints(&Endpoints::default())
    }
}

pub fn local_millis() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// Accept either `"1700000000000"` or `1700000000000`. Anything that is not
/// a positive `i64` is rejected so the chain moves on.
fn parse_millis(value: &serde_json::Value) -> Option<String> {
    let millis = match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            s.parse::<i64>().ok()?
        }
        serde_json::Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    (millis > 0).then(|| millis.to_string())
}
