// ── Observable connection state ──
//
// Published on a `watch` channel by the bridge after every router pass.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::poller::DiscoveryState;

/// Event stream health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamState {
    /// The gateway accepted our credentials on the last attempt.
    pub valid: bool,
    /// A connection is currently open.
    pub reachable: bool,
    /// Number of successful opens since the bridge started.
    pub connections: u32,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
    /// Messages received; wraps back to 0 at `u64::MAX`, then counts on.
    pub event_count: u64,
}

impl StreamState {
    pub fn on_open(&mut self, now: DateTime<Utc>) {
        self.valid = true;
        self.reachable = true;
        self.connections = self.connections.wrapping_add(1);
        self.last_connected = Some(now);
    }

    pub fn on_message(&mut self, now: DateTime<Utc>) {
        if self.event_count == u64::MAX {
            self.event_count = 0;
        }
        self.event_count += 1;
        self.last_event = Some(now);
    }

    pub fn on_disconnect(&mut self, now: DateTime<Utc>) {
        self.reachable = false;
        self.last_disconnected = Some(now);
    }

    pub fn on_unauthorized(&mut self, now: DateTime<Utc>) {
        self.valid = false;
        self.on_disconnect(now);
    }
}

/// Everything consumers can observe about the gateway connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// The catalog became valid and the event stream was started.
    pub ready: bool,
    pub discovery: DiscoveryState,
    pub stream: StreamState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_count_wraps() {
        let mut stream = StreamState {
            event_count: u64::MAX,
            ..StreamState::default()
        };
        stream.on_message(Utc::now());
        assert_eq!(stream.event_count, 1);
        assert!(stream.last_event.is_some());
        stream.on_message(Utc::now());
        assert_eq!(stream.event_count, 2);
    }

    #[test]
    fn unauthorized_invalidates_stream() {
        let mut stream = StreamState::default();
        stream.on_open(Utc::now());
        assert!(stream.valid && stream.reachable);
        stream.on_unauthorized(Utc::now());
        assert!(!stream.valid);
        assert!(!stream.reachable);
        assert_eq!(stream.connections, 1);
    }
}
