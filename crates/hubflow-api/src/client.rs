// Gateway REST client
//
// Wraps `reqwest::Client` with API-key scoped URL construction, the
// gateway's error-array decoding and a bounded retry for transient
// failures. Only the read endpoints the bridge needs live here; command
// construction belongs to the outbound collaborator.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::models::{ERROR_UNAUTHORIZED_USER, FullState, GatewayConfig, GatewayErrorEntry};
use crate::transport::TransportConfig;

/// Raw HTTP client for the gateway's REST API.
///
/// Every path is scoped under `/api/{api_key}`. Methods return decoded
/// payloads; HTTP and gateway-level failures surface as [`Error`].
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    retries: u32,
    timeout_ms: u64,
}

impl GatewayClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the gateway root, e.g. `http://192.168.1.10:80`.
    pub fn new(
        base_url: Url,
        api_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            retries: transport.retries,
            timeout_ms: u64::try_from(transport.timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Create a client with a pre-built `reqwest::Client` and no retries.
    pub fn with_client(http: reqwest::Client, base_url: Url, api_key: SecretString) -> Self {
        Self {
            http,
            base_url,
            api_key,
            retries: 0,
            timeout_ms: 0,
        }
    }

    /// The gateway base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Host part of the base URL, used to derive the event stream address.
    pub fn host(&self) -> Option<&str> {
        self.base_url.host_str()
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch the complete gateway state (`GET /api/{key}`).
    pub async fn fetch_snapshot(&self) -> Result<FullState, Error> {
        let url = self.api_url("")?;
        self.get_with_retry(url).await
    }

    /// Fetch the gateway configuration (`GET /api/{key}/config`).
    pub async fn fetch_gateway_config(&self) -> Result<GatewayConfig, Error> {
        let url = self.api_url("config")?;
        self.get_with_retry(url).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/{key}/{path}`.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let key = self.api_key.expose_secret();
        let full = if path.is_empty() {
            format!("{base}/api/{key}")
        } else {
            format!("{base}/api/{key}/{path}")
        };
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_with_retry<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let mut attempt = 0;
        loop {
            match self.get(url.clone()).await {
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "transient gateway error, retrying");
                }
                other => return other,
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        // The key is part of the path; never log it.
        debug!(path = %redact(&url), "GET");

        let resp = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                // reqwest prints the request URL, and the URL holds the key.
                Error::Transport(e.without_url())
            }
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Transport(e.without_url()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Unauthorized);
        }

        if let Some(err) = gateway_error(&body) {
            return Err(err);
        }

        if !status.is_success() {
            return Err(Error::Gateway {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

/// Decode the gateway's `[{ "error": {...} }]` body, if that is what we got.
fn gateway_error(body: &str) -> Option<Error> {
    let entries: Vec<GatewayErrorEntry> = serde_json::from_str(body).ok()?;
    let first = entries.into_iter().next()?;
    if first.error.error_type == ERROR_UNAUTHORIZED_USER {
        return Some(Error::Unauthorized);
    }
    Some(Error::Gateway {
        status: 200,
        message: first
            .error
            .description
            .unwrap_or_else(|| format!("error type {}", first.error.error_type)),
    })
}

/// Replace the API key segment of a gateway URL for logging.
fn redact(url: &Url) -> String {
    let mut segments = url.path().split('/').collect::<Vec<_>>();
    if let Some(pos) = segments.iter().position(|s| *s == "api") {
        if let Some(key) = segments.get_mut(pos + 1) {
            *key = "***";
        }
    }
    segments.join("/")
}
