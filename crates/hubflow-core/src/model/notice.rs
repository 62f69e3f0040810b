// ── Listener notices ──
//
// What the router hands to listeners. Serialized in camelCase because
// listeners are typically flow-engine nodes consuming JSON.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::device::{ChangeSet, Device};

/// Error code attached to diagnostics for unknown devices.
pub const DEVICE_NOT_FOUND: &str = "DEVICE_NOT_FOUND";

/// Error code attached to notices for unevaluable queries.
pub const INVALID_QUERY: &str = "INVALID_QUERY";

/// A notice delivered to one listener.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Synthetic full-state notice issued at startup and on reconnect.
    Start {
        #[serde(rename = "deviceSnapshot")]
        device: Arc<Device>,
        #[serde(rename = "initialEvent")]
        initial_event: bool,
    },
    /// A delta was applied to a device.
    Change {
        #[serde(rename = "deviceSnapshot")]
        device: Arc<Device>,
        changed: ChangeSet,
        #[serde(rename = "rawEvent")]
        raw_event: Arc<Value>,
    },
    /// Connectivity or evaluation failure.
    Error(ErrorNotice),
    /// The bridge could not resolve something a listener depends on.
    Diagnostic(Diagnostic),
}

impl Notice {
    pub fn start(device: Arc<Device>) -> Self {
        Self::Start {
            device,
            initial_event: true,
        }
    }

    /// The device this notice is about, if any.
    pub fn device(&self) -> Option<&Device> {
        match self {
            Self::Start { device, .. } | Self::Change { device, .. } => Some(device),
            Self::Error(e) => e.device.as_deref(),
            Self::Diagnostic(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    #[serde(rename = "deviceSnapshot")]
    pub device: Option<Arc<Device>>,
    pub error_code: String,
    pub error_msg: String,
    pub is_global_error: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub error_event: bool,
    pub error_code: String,
    pub error_msg: String,
}

impl Diagnostic {
    pub fn device_not_found(what: impl std::fmt::Display) -> Self {
        Self {
            error_event: true,
            error_code: DEVICE_NOT_FOUND.to_owned(),
            error_msg: format!("device not found: {what}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::Domain;

    #[test]
    fn diagnostic_wire_shape() {
        let notice = Notice::Diagnostic(Diagnostic::device_not_found("lights/device_id/9"));
        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "diagnostic",
                "errorEvent": true,
                "errorCode": "DEVICE_NOT_FOUND",
                "errorMsg": "device not found: lights/device_id/9"
            })
        );
    }

    #[test]
    fn error_notice_wire_shape() {
        let notice = Notice::Error(ErrorNotice {
            device: None,
            error_code: "GATEWAY_UNREACHABLE".into(),
            error_msg: "cannot reach the gateway".into(),
            is_global_error: true,
        });
        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(value["isGlobalError"], true);
        assert_eq!(value["deviceSnapshot"], Value::Null);
        assert!(notice.device().is_none());
    }

    #[test]
    fn start_notice_carries_device_snapshot() {
        let record = serde_json::from_value(json!({ "name": "Kitchen", "state": { "on": true } })).unwrap();
        let device = Device::from_record(Domain::Lights, "4", record);
        let value = serde_json::to_value(Notice::start(Arc::new(device))).unwrap();
        assert_eq!(value["kind"], "start");
        assert_eq!(value["initialEvent"], true);
        assert_eq!(value["deviceSnapshot"]["name"], "Kitchen");
        assert!(value.get("device").is_none());
    }
}
