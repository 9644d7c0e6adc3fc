//! Retrying HTTP client factory.
//!
//! Every account gets its own [`HttpClient`] bound to the account's proxy.
//! The client retries transient failures (connect errors, timeouts and the
//! statuses in [`RETRY_STATUSES`]) up to `max_retries` times. The wait is the
//! server's `Retry-After` when it sends one, doubling backoff otherwise. When
//! the budget is spent the last response is handed back as is. Callers that
//! run their own loop for a status (the login handshake does for 429) use
//! [`HttpClient::send_passing`] to see it on the first answer.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::HttpError;

pub const USER_AGENT: &str = "MiFit/6.12.0 (MCE16; Android 16; Density/1.5)";
pub const APP_NAME: &str = "com.xiaomi.hm.health";

/// Statuses worth another attempt.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Transport tuning, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_read_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl HttpConfig {
    /// Delay before retry number `attempt` (1-based): base, 2*base, 4*base, ...
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }
}

/// A configured client plus its retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    config: HttpConfig,
}

/// Build a client with the shared timeouts and headers, routed through `proxy`
/// for both HTTP and HTTPS when one is given.
///
/// # Errors
/// Returns `HttpError::InvalidProxy` if the proxy URL is unusable, or
/// `HttpError::Transport` if the TLS backend cannot be initialised.
pub fn create_client(config: &HttpConfig, proxy: Option<&str>) -> Result<HttpClient, HttpError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("app_name"),
        HeaderValue::from_static(APP_NAME),
    );

    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs));

    if let Some(proxy_url) = proxy.filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| HttpError::InvalidProxy {
            proxy: proxy_url.to_string(),
            message: e.to_string(),
        })?;
        builder = builder.proxy(proxy);
    }

    let inner = builder.build().map_err(HttpError::Transport)?;
    Ok(HttpClient {
        inner,
        config: config.clone(),
    })
}

fn is_retryable(status: StatusCode) -> bool {
    RETRY_STATUSES.contains(&status.as_u16())
}

impl HttpClient {
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Send a request, rebuilding it with `build` for every attempt.
    ///
    /// Returns the final response whatever its status; only transport
    /// failures become errors.
    pub async fn send<F>(&self, build: F) -> Result<Response, HttpError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.send_passing(build, &[]).await
    }

    /// Like [`send`](Self::send), but a status in `passthrough` is returned
    /// on first sight instead of being retried here.
    pub async fn send_passing<F>(
        &self,
        build: F,
        passthrough: &[StatusCode],
    ) -> Result<Response, HttpError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let wait = match build(&self.inner).send().await {
                Ok(resp)
                    if is_retryable(resp.status())
                        && !passthrough.contains(&resp.status())
                        && attempt < self.config.max_retries =>
                {
                    attempt += 1;
                    let wait = retry_after(resp.headers())
                        .map(|d| d.min(MAX_BACKOFF))
                        .unwrap_or_else(|| self.config.backoff_delay(attempt));
                    tracing::warn!(
                        url = %resp.url(),
                        status = resp.status().as_u16(),
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "transient status, retrying"
                    );
                    wait
                }
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "transport failure, retrying");
                    self.config.backoff_delay(attempt)
                }
                Err(e) => return Err(HttpError::Transport(e)),
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Like [`send`](Self::send) but turns any non-2xx status into `HttpError::Remote`.
    pub async fn send_checked<F>(&self, build: F) -> Result<Response, HttpError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let resp = self.send(build).await?;
        ensure_success(resp).await
    }
}

/// `Retry-After` as whole seconds. HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a non-2xx response to `HttpError::Remote`, keeping its body.
pub async fn ensure_success(resp: Response) -> Result<Response, HttpError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(HttpError::Remote {
        status: status.as_u16(),
        body,
    })
}

/// Read a body as JSON, keeping the raw text for error messages.
pub async fn read_json(resp: Response) -> Result<(serde_json::Value, String), HttpError> {
    let text = resp.text().await?;
    let value = serde_json::from_str(&text)
        .map_err(|e| HttpError::Decode(format!("{e}: {}", truncate(&text, 200))))?;
    Ok((value, text))
}

pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast_config(max_retries: u32) -> HttpConfig {
        HttpConfig {
            connect_timeout_secs: 2,
            read_timeout_secs: 5,
            max_retries,
            backoff_base_ms: 5,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = HttpConfig::default();
        assert_eq!(cfg.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(cfg.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(cfg.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(cfg.backoff_delay(40), MAX_BACKOFF);
    }

    #[test]
    fn invalid_proxy_rejected() {
        let err = create_client(&HttpConfig::default(), Some("::not a url::")).unwrap_err();
        assert!(matches!(err, HttpError::InvalidProxy { .. }));
    }

    #[test]
    fn blank_proxy_ignored() {
        assert!(create_client(&HttpConfig::default(), Some("  ")).is_ok());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("步数步数", 2), "步数");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[tokio::test]
    async fn retries_transient_status_until_budget_spent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .with_body("busy")
            .expect(3)
            .create_async()
            .await;

        let client = create_client(&fast_config(2), None).unwrap();
        let url = format!("{}/flaky", server.url());
        let err = client.send_checked(|c| c.get(&url)).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_retryable_status_returned_immediately() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = create_client(&fast_config(3), None).unwrap();
        let url = format!("{}/missing", server.url());
        let resp = client.send(|c| c.get(&url)).await.unwrap();

        assert_eq!(resp.status().as_u16(), 404);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sends_client_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/hdr")
            .match_header("user-agent", USER_AGENT)
            .match_header("app_name", APP_NAME)
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = create_client(&fast_config(0), None).unwrap();
        let url = format!("{}/hdr", server.url());
        let resp = client.send_checked(|c| c.get(&url)).await.unwrap();
        let (json, _) = read_json(resp).await.unwrap();

        assert_eq!(json["ok"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let client = create_client(&fast_config(0), None).unwrap();
        let err = client
            .send(|c| c.get("http://127.0.0.1:1/unreachable"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
    }

    /// Serves one response whose body trickles out a byte at a time.
    fn trickle_server(body: &'static [u8], gap: Duration) -> String {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            for byte in body {
                std::thread::sleep(gap);
                stream.write_all(&[*byte]).unwrap();
                stream.flush().unwrap();
            }
        });
        format!("http://{addr}/slow")
    }

    fn read_timeout_config(secs: u64) -> HttpConfig {
        HttpConfig {
            read_timeout_secs: secs,
            ..fast_config(0)
        }
    }

    #[tokio::test]
    async fn slow_body_outlives_read_timeout_while_bytes_keep_arriving() {
        let url = trickle_server(b"hello", Duration::from_millis(400));
        let client = create_client(&read_timeout_config(1), None).unwrap();

        let started = Instant::now();
        let resp = client.send_checked(|c| c.get(&url)).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "hello");
        assert!(started.elapsed() > Duration::from_secs(1));
    }

    #[tokio::test]
    async fn stalled_body_hits_read_timeout() {
        let url = trickle_server(b"x", Duration::from_millis(2500));
        let client = create_client(&read_timeout_config(1), None).unwrap();

        let resp = client.send_checked(|c| c.get(&url)).await.unwrap();
        assert!(resp.text().await.is_err());
    }

    #[tokio::test]
    async fn retry_waits_for_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/busy")
            .with_status(503)
            .with_header("Retry-After", "1")
            .expect(2)
            .create_async()
            .await;

        let client = create_client(&fast_config(1), None).unwrap();
        let url = format!("{}/busy", server.url());
        let started = Instant::now();
        let resp = client.send(|c| c.get(&url)).await.unwrap();

        assert_eq!(resp.status().as_u16(), 503);
        assert!(started.elapsed() >= Duration::from_secs(1));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn passthrough_status_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/limited")
            .with_status(429)
            .expect(1)
            .create_async()
            .await;

        let client = create_client(&fast_config(3), None).unwrap();
        let url = format!("{}/limited", server.url());
        let resp = client
            .send_passing(|c| c.post(&url), &[StatusCode::TOO_MANY_REQUESTS])
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        mock.assert_async().await;
    }

    #[test]
    fn retry_after_reads_whole_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 2 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }
}
