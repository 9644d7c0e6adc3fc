//! Pre-run network check.
//!
//! Resolves the login host once before any account is processed so a broken
//! resolver shows up as one clear log line instead of a failure per account.
//! It only reports; the run goes ahead either way.

use std::time::Duration;

const PROBE_PORT: u16 = 443;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a DNS probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Resolved { host: String, addresses: usize },
    Failed { host: String, reason: String },
}

impl ProbeResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeResult::Resolved { .. })
    }
}

/// Resolve `host:443` and log the result.
pub async fn probe_dns(host: &str) -> ProbeResult {
    let target = format!("{host}:{PROBE_PORT}");
    let result = match tokio::time::timeout(PROBE_TIMEOUT, tokio::net::lookup_host(target)).await {
        Ok(Ok(addrs)) => {
            let addresses = addrs.count();
            if addresses > 0 {
                ProbeResult::Resolved {
                    host: host.to_string(),
                    addresses,
                }
            } else {
                ProbeResult::Failed {
                    host: host.to_string(),
                    reason: "no addresses returned".into(),
                }
            }
        }
        Ok(Err(e)) => ProbeResult::Failed {
            host: host.to_string(),
            reason: e.to_string(),
        },
        Err(_) => ProbeResult::Failed {
            host: host.to_string(),
            reason: format!("timed out after {}s", PROBE_TIMEOUT.as_secs()),
        },
    };

    match &result {
        ProbeResult::Resolved { host, addresses } => {
            tracing::info!(%host, addresses, "DNS resolution ok");
        }
        ProbeResult::Failed { host, reason } => {
            tracing::warn!(%host, %reason, "DNS resolution failed; check the resolver configuration");
        }
    }
    result
}
