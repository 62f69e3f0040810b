//! Gateway event stream with auto-reconnect and heartbeat supervision.
//!
//! Connects to the gateway's event-stream endpoint and forwards lifecycle
//! signals and parsed delta messages through a [`tokio::sync::mpsc`]
//! channel. Reconnection uses exponential backoff + jitter; a connection
//! that stays silent past the pong timeout is torn down and re-dialed.
//!
//! # Example
//!
//! ```rust,ignore
//! use hubflow_api::websocket::{EventSocket, SocketConfig, SocketSignal};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("ws://192.168.1.10:443")?;
//!
//! let (socket, mut signals) = EventSocket::spawn(url, SocketConfig::default(), cancel);
//! while let Some(signal) = signals.recv().await {
//!     if let SocketSignal::Message { event, .. } = signal {
//!         println!("{:?} on {}/{:?}", event.kind, event.resource, event.id);
//!     }
//! }
//! socket.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, http::StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::GatewayEvent;

// ── Channel capacity ─────────────────────────────────────────────────

const SIGNAL_CHANNEL_CAPACITY: usize = 1024;

// ── SocketSignal ─────────────────────────────────────────────────────

/// Lifecycle signal or message emitted by the connector.
#[derive(Debug, Clone)]
pub enum SocketSignal {
    /// A connection was (re-)established.
    Open,
    /// A well-formed delta message. `raw` is the untouched JSON frame.
    Message {
        event: GatewayEvent,
        raw: Arc<Value>,
    },
    /// A text frame that is not a recognisable delta message.
    Malformed { reason: String, raw: String },
    /// Dialing or reading failed.
    Error { reason: String },
    /// The gateway closed the connection.
    Closed { code: u16, reason: String },
    /// Nothing was received within the pong timeout.
    HeartbeatTimeout,
    /// The upgrade request was refused (HTTP 401/403).
    Unauthorized,
}

// ── Configuration ────────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Connector tuning.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub reconnect: ReconnectConfig,
    /// How often a ping is sent on an idle connection. Default: 10s.
    pub heartbeat_interval: Duration,
    /// Silence longer than this drops the connection. Default: 20s.
    pub pong_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

// ── EventSocket ──────────────────────────────────────────────────────

/// Handle to a running event-stream connector.
///
/// Call [`shutdown`](Self::shutdown) to tear down the background task; no
/// signals are emitted after cancellation is observed.
pub struct EventSocket {
    cancel: CancellationToken,
}

impl EventSocket {
    /// Spawn the connector task and return its handle and signal receiver.
    ///
    /// The first connection attempt happens asynchronously.
    pub fn spawn(
        url: Url,
        config: SocketConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<SocketSignal>) {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            socket_loop(url, signal_tx, config, task_cancel).await;
        });

        (Self { cancel }, signal_rx)
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// How a single connection ended.
enum SessionEnd {
    /// Cancelled or the consumer went away; stop for good.
    Stop,
    /// Clean close; reconnect immediately.
    Closed,
}

/// Main loop: connect → read → on error, backoff → reconnect.
async fn socket_loop(
    url: Url,
    signal_tx: mpsc::Sender<SocketSignal>,
    config: SocketConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&url, &signal_tx, &cancel, &config) => result,
        };

        match result {
            Ok(SessionEnd::Stop) => break,
            Ok(SessionEnd::Closed) => {
                tracing::info!("event stream closed, reconnecting");
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "event stream error");

                if let Some(max) = config.reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "event stream reconnection limit reached, giving up"
                        );
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &config.reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt = attempt.saturating_add(1);
            }
        }
    }

    tracing::debug!("event stream loop exiting");
}

/// Forward a signal; `false` means the consumer is gone.
async fn emit(signal_tx: &mpsc::Sender<SocketSignal>, signal: SocketSignal) -> bool {
    signal_tx.send(signal).await.is_ok()
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    signal_tx: &mpsc::Sender<SocketSignal>,
    cancel: &CancellationToken,
    config: &SocketConfig,
) -> Result<SessionEnd, Error> {
    tracing::info!(url = %url, "connecting to event stream");

    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(tungstenite::Error::Http(response))
            if response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN =>
        {
            if !emit(signal_tx, SocketSignal::Unauthorized).await {
                return Ok(SessionEnd::Stop);
            }
            return Err(Error::WebSocketConnect(format!(
                "upgrade refused with HTTP {}",
                response.status()
            )));
        }
        Err(e) => {
            let reason = e.to_string();
            if !emit(signal_tx, SocketSignal::Error { reason: reason.clone() }).await {
                return Ok(SessionEnd::Stop);
            }
            return Err(Error::WebSocketConnect(reason));
        }
    };

    tracing::info!("event stream connected");
    if !emit(signal_tx, SocketSignal::Open).await {
        return Ok(SessionEnd::Stop);
    }

    let (mut write, mut read) = ws_stream.split();
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.tick().await; // consume the immediate first tick
    let mut last_frame = Instant::now();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(SessionEnd::Stop),
            _ = heartbeat.tick() => {
                if last_frame.elapsed() > config.pong_timeout {
                    tracing::warn!("event stream heartbeat timeout");
                    if !emit(signal_tx, SocketSignal::HeartbeatTimeout).await {
                        return Ok(SessionEnd::Stop);
                    }
                    return Err(Error::Timeout {
                        timeout_ms: u64::try_from(config.pong_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    });
                }
                if let Err(e) = write.send(tungstenite::Message::Ping(Vec::new().into())).await {
                    tracing::debug!(error = %e, "failed to send ping");
                }
            }
            frame = read.next() => {
                last_frame = Instant::now();
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if !emit(signal_tx, parse_frame(&text)).await {
                            return Ok(SessionEnd::Stop);
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                            .unwrap_or((1005, String::new()));
                        tracing::info!(code, reason = %reason, "event stream close frame received");
                        if !emit(signal_tx, SocketSignal::Closed { code, reason }).await {
                            return Ok(SessionEnd::Stop);
                        }
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Err(e)) => {
                        let reason = e.to_string();
                        if !emit(signal_tx, SocketSignal::Error { reason: reason.clone() }).await {
                            return Ok(SessionEnd::Stop);
                        }
                        return Err(Error::WebSocketConnect(reason));
                    }
                    None => {
                        // Stream ended without a close frame
                        if !emit(signal_tx, SocketSignal::Closed {
                            code: 1006,
                            reason: "stream ended without close frame".into(),
                        }).await {
                            return Ok(SessionEnd::Stop);
                        }
                        return Ok(SessionEnd::Closed);
                    }
                    _ => {
                        // Ping, Pong, Binary, Frame: only refresh liveness
                        tracing::trace!("event stream control frame");
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Turn a text frame into a `Message` or `Malformed` signal.
fn parse_frame(text: &str) -> SocketSignal {
    let raw: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return SocketSignal::Malformed {
                reason: e.to_string(),
                raw: text.to_owned(),
            };
        }
    };

    match GatewayEvent::deserialize(&raw) {
        Ok(event) => SocketSignal::Message {
            event,
            raw: Arc::new(raw),
        },
        Err(e) => SocketSignal::Malformed {
            reason: e.to_string(),
            raw: text.to_owned(),
        },
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms after a gateway reboot.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::EventKind;

    #[test]
    fn default_socket_config() {
        let config = SocketConfig::default();
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(30));
        assert!(config.reconnect.max_retries.is_none());
        assert!(config.pong_timeout > config.heartbeat_interval);
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn parse_changed_frame() {
        let text = r#"{"t":"event","e":"changed","r":"sensors","id":"3","state":{"buttonevent":1002}}"#;

        match parse_frame(text) {
            SocketSignal::Message { event, raw } => {
                assert_eq!(event.kind, EventKind::Changed);
                assert_eq!(event.resource, "sensors");
                assert_eq!(raw["state"]["buttonevent"], 1002);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn parse_non_json_frame_is_malformed() {
        assert!(matches!(
            parse_frame("not json at all"),
            SocketSignal::Malformed { .. }
        ));
    }

    #[test]
    fn parse_unknown_message_type_is_malformed() {
        let text = r#"{"t":"status","e":"changed","r":"lights","id":"1"}"#;
        match parse_frame(text) {
            SocketSignal::Malformed { raw, .. } => assert_eq!(raw, text),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn emit_reports_dropped_consumer() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!emit(&tx, SocketSignal::Open).await);
    }

    #[tokio::test]
    async fn unreachable_gateway_emits_error_signal() {
        let cancel = CancellationToken::new();
        let config = SocketConfig {
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                max_retries: Some(0),
            },
            ..SocketConfig::default()
        };
        // Port 9 (discard) on localhost is closed in test environments.
        let url = Url::parse("ws://127.0.0.1:9").unwrap();
        let (_socket, mut rx) = EventSocket::spawn(url, config, cancel);

        let signal = rx.recv().await.unwrap();
        assert!(matches!(signal, SocketSignal::Error { .. }), "got {signal:?}");
    }
}
