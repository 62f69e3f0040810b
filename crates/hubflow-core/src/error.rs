// ── Core error types ──
//
// User-facing errors from hubflow-core. Consumers never see HTTP status
// codes or JSON parse failures directly: the `From<hubflow_api::Error>`
// impl translates transport-layer errors into bridge-level variants.

use thiserror::Error;

use crate::query::QueryError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to gateway at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Gateway rejected the API key")]
    Unauthorized,

    #[error("Gateway request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Bridge is not running")]
    NotRunning,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error(transparent)]
    InvalidQuery(#[from] QueryError),

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hubflow_api::Error> for CoreError {
    fn from(err: hubflow_api::Error) -> Self {
        match err {
            hubflow_api::Error::Unauthorized => CoreError::Unauthorized,
            hubflow_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_ms: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.host_str().unwrap_or_default().to_owned())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            hubflow_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            hubflow_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            hubflow_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            hubflow_api::Error::Gateway { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            hubflow_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("event stream connection failed: {reason}"),
            },
            hubflow_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("event stream closed (code {code}): {reason}"),
            },
            hubflow_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_through() {
        let err = CoreError::from(hubflow_api::Error::Unauthorized);
        assert!(matches!(err, CoreError::Unauthorized));
    }

    #[test]
    fn gateway_status_is_preserved() {
        let err = CoreError::from(hubflow_api::Error::Gateway {
            status: 503,
            message: "busy".into(),
        });
        match err {
            CoreError::Api { status, message } => {
                assert_eq!(status, Some(503));
                assert_eq!(message, "busy");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }
}
