// ── Runtime bridge configuration ──
//
// These types describe *how* to reach a gateway and pace the poller.
// They carry credential data and tuning, but never touch disk: the CLI
// (via hubflow-config) constructs a `BridgeConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use hubflow_api::transport::{DEFAULT_REQUEST_TIMEOUT, TlsMode, TransportConfig};
use hubflow_api::{ReconnectConfig, SocketConfig};

/// Default discovery poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Shortest poll interval honoured; anything below falls back to
/// [`DEFAULT_POLL_INTERVAL`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Delay between bridge start and the first discovery fetch.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(1500);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Configuration for bridging a single gateway.
///
/// Built by the CLI, passed to `Bridge` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Gateway REST root (e.g., `http://192.168.1.10:80`).
    pub url: Url,
    /// API key issued by the gateway.
    pub api_key: SecretString,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// REST request timeout.
    pub request_timeout: Duration,
    /// Extra attempts for a transient REST failure.
    pub request_retries: u32,
    /// Configured discovery poll interval (before the floor is applied).
    pub poll_interval: Duration,
    /// Delay before the first discovery fetch.
    pub startup_delay: Duration,
    /// Event stream port. `None` asks the gateway.
    pub websocket_port: Option<u16>,
    /// Use `wss://` for the event stream.
    pub secure_websocket: bool,
    /// Idle ping cadence on the event stream.
    pub heartbeat_interval: Duration,
    /// Silence tolerated on the event stream before reconnecting.
    pub pong_timeout: Duration,
    /// Upper bound for event stream reconnect backoff.
    pub reconnect_max_delay: Duration,
}

impl BridgeConfig {
    /// Configuration with default tuning for the given gateway.
    pub fn new(url: Url, api_key: SecretString) -> Self {
        let socket = SocketConfig::default();
        Self {
            url,
            api_key,
            tls: TlsVerification::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            request_retries: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_delay: DEFAULT_STARTUP_DELAY,
            websocket_port: None,
            secure_websocket: false,
            heartbeat_interval: socket.heartbeat_interval,
            pong_timeout: socket.pong_timeout,
            reconnect_max_delay: socket.reconnect.max_delay,
        }
    }

    /// Poll interval after the floor rule is applied.
    pub fn effective_poll_interval(&self) -> Duration {
        effective_poll_interval(self.poll_interval)
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.request_timeout,
            retries: self.request_retries,
        }
    }

    pub(crate) fn socket(&self) -> SocketConfig {
        SocketConfig {
            reconnect: ReconnectConfig {
                max_delay: self.reconnect_max_delay,
                ..ReconnectConfig::default()
            },
            heartbeat_interval: self.heartbeat_interval,
            pong_timeout: self.pong_timeout,
        }
    }
}

/// Intervals shorter than [`MIN_POLL_INTERVAL`] are replaced by the default.
pub fn effective_poll_interval(configured: Duration) -> Duration {
    if configured >= MIN_POLL_INTERVAL {
        configured
    } else {
        DEFAULT_POLL_INTERVAL
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn short_intervals_fall_back_to_default() {
        assert_eq!(effective_poll_interval(Duration::from_secs(2)), DEFAULT_POLL_INTERVAL);
        assert_eq!(effective_poll_interval(Duration::ZERO), DEFAULT_POLL_INTERVAL);
        assert_eq!(
            effective_poll_interval(Duration::from_secs(3)),
            Duration::from_secs(3)
        );
        assert_eq!(
            effective_poll_interval(Duration::from_secs(60)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn defaults_follow_gateway_policy() {
        let config = BridgeConfig::new(
            Url::parse("http://10.0.0.2").unwrap(),
            SecretString::from("KEY".to_string()),
        );
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.request_retries, 1);
        assert_eq!(config.startup_delay, Duration::from_millis(1500));
        assert_eq!(config.socket().pong_timeout, Duration::from_secs(20));
        assert!(matches!(config.transport().tls, TlsMode::System));
    }
}
