// Gateway REST + event stream wire types
//
// Models for the gateway's JSON API. Device records keep every field the
// gateway sends: the commonly needed ones are typed, the rest land in
// `extra`. Fields use `#[serde(default)]` liberally because the set of
// attributes varies wildly between device types and firmware versions.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Device domains carried by the full-state payload, in catalog order.
pub const DEVICE_DOMAINS: [&str; 3] = ["lights", "sensors", "groups"];

// ── Full state ───────────────────────────────────────────────────────

/// Response of `GET /api/{key}`: the complete gateway state.
///
/// Only the device-bearing domains are modelled. Rules, schedules and
/// resource links are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FullState {
    #[serde(default)]
    pub lights: IndexMap<String, DeviceRecord>,
    #[serde(default)]
    pub sensors: IndexMap<String, DeviceRecord>,
    #[serde(default)]
    pub groups: IndexMap<String, DeviceRecord>,
    #[serde(default)]
    pub config: Option<GatewayConfig>,
}

impl FullState {
    /// Split into the domain-keyed mapping the device catalog consumes,
    /// preserving [`DEVICE_DOMAINS`] order.
    pub fn into_domains(self) -> IndexMap<String, IndexMap<String, DeviceRecord>> {
        let mut domains = IndexMap::with_capacity(DEVICE_DOMAINS.len());
        domains.insert("lights".to_owned(), self.lights);
        domains.insert("sensors".to_owned(), self.sensors);
        domains.insert("groups".to_owned(), self.groups);
        domains
    }
}

/// One raw device record (light, sensor or group).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub uniqueid: Option<String>,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Everything else the gateway reports (modelid, manufacturername, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `GET /api/{key}/config` (subset).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub apiversion: Option<String>,
    #[serde(default)]
    pub swversion: Option<String>,
    /// Port of the event stream; absent on very old firmware.
    #[serde(default)]
    pub websocketport: Option<u16>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error object in the gateway's `[{ "error": { ... } }]` responses.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayErrorEntry {
    pub error: GatewayErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayErrorBody {
    #[serde(rename = "type")]
    pub error_type: i64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Gateway error type 1: unauthorized user.
pub(crate) const ERROR_UNAUTHORIZED_USER: i64 = 1;

// ── Event stream ─────────────────────────────────────────────────────

/// Top-level message type (`t`). Only `event` is defined by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Event,
}

/// Event kind (`e`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Changed,
    Added,
    Deleted,
    SceneCalled,
}

impl EventKind {
    /// Added/deleted events change catalog membership instead of state.
    pub fn alters_membership(self) -> bool {
        matches!(self, Self::Added | Self::Deleted)
    }
}

/// A delta message from the event stream.
///
/// ```json
/// { "t": "event", "e": "changed", "r": "lights", "id": "1",
///   "state": { "on": true } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "t")]
    pub message_type: MessageType,
    #[serde(rename = "e")]
    pub kind: EventKind,
    /// Resource domain: `lights`, `sensors`, `groups`, `scenes`, ...
    #[serde(rename = "r")]
    pub resource: String,
    #[serde(default, deserialize_with = "opt_id")]
    pub id: Option<String>,
    /// Group id, present on `scene-called`.
    #[serde(default, deserialize_with = "opt_id")]
    pub gid: Option<String>,
    /// Scene id, present on `scene-called`.
    #[serde(default, deserialize_with = "opt_id")]
    pub scid: Option<String>,
    #[serde(default)]
    pub uniqueid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<Map<String, Value>>,
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    #[serde(default)]
    pub attr: Option<Value>,
}

/// Accept ids sent either as JSON strings or numbers.
fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserialize_changed_event() {
        let event: GatewayEvent = serde_json::from_value(json!({
            "t": "event",
            "e": "changed",
            "r": "lights",
            "id": "1",
            "state": { "on": true, "bri": 120 }
        }))
        .unwrap();

        assert_eq!(event.kind, EventKind::Changed);
        assert_eq!(event.resource, "lights");
        assert_eq!(event.id.as_deref(), Some("1"));
        assert_eq!(event.state.unwrap()["bri"], 120);
        assert!(event.config.is_none());
    }

    #[test]
    fn numeric_ids_are_normalised_to_strings() {
        let event: GatewayEvent = serde_json::from_value(json!({
            "t": "event",
            "e": "scene-called",
            "r": "scenes",
            "gid": 7,
            "scid": 2
        }))
        .unwrap();

        assert_eq!(event.kind, EventKind::SceneCalled);
        assert_eq!(event.gid.as_deref(), Some("7"));
        assert_eq!(event.scid.as_deref(), Some("2"));
        assert!(event.id.is_none());
    }

    #[test]
    fn unknown_event_kind_is_rejected() {
        let result = serde_json::from_value::<GatewayEvent>(json!({
            "t": "event",
            "e": "exploded",
            "r": "lights",
            "id": "1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn device_record_keeps_unknown_fields() {
        let record: DeviceRecord = serde_json::from_value(json!({
            "name": "Hall",
            "type": "Extended color light",
            "uniqueid": "00:11:22:33:44:55:66:77-0b",
            "modelid": "LCT015",
            "state": { "on": false },
            "config": {}
        }))
        .unwrap();

        assert_eq!(record.name.as_deref(), Some("Hall"));
        assert_eq!(record.device_type.as_deref(), Some("Extended color light"));
        assert_eq!(record.extra["modelid"], "LCT015");
        assert_eq!(record.state["on"], false);
    }

    #[test]
    fn full_state_domains_keep_catalog_order() {
        let state: FullState = serde_json::from_value(json!({
            "groups": { "7": { "name": "Living" } },
            "sensors": { "3": { "name": "Switch" } },
            "lights": { "1": { "name": "Hall" } },
            "rules": {}
        }))
        .unwrap();

        let domains = state.into_domains();
        let order: Vec<&str> = domains.keys().map(String::as_str).collect();
        assert_eq!(order, DEVICE_DOMAINS);
        assert_eq!(domains["groups"]["7"].name.as_deref(), Some("Living"));
    }
}
