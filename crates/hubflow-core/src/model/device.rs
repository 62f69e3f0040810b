// ── Device domain types ──

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hubflow_api::{DeviceRecord, GatewayEvent};

// ── Domain ───────────────────────────────────────────────────────────

/// Device category reported by the gateway.
///
/// The three catalogued domains are named; anything else the gateway
/// sends (`scenes`, `rules`, ...) is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Domain {
    Lights,
    Sensors,
    Groups,
    Other(String),
}

impl Domain {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Lights => "lights",
            Self::Sensors => "sensors",
            Self::Groups => "groups",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        match s {
            "lights" => Self::Lights,
            "sensors" => Self::Sensors,
            "groups" => Self::Groups,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> Self {
        d.as_str().to_owned()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Device ───────────────────────────────────────────────────────────

/// A device as held in the catalog.
///
/// `device_path` is the stable identity: `{domain}/uniqueid/{uniqueid}`
/// when the gateway reports a unique id, `{domain}/device_id/{id}`
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub device_path: String,
    pub domain: Domain,
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub uniqueid: Option<String>,
    pub state: Map<String, Value>,
    pub config: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    /// Build a catalog device from a raw gateway record.
    pub fn from_record(domain: Domain, id: &str, record: DeviceRecord) -> Self {
        let device_path = Self::path_for(&domain, id, record.uniqueid.as_deref());
        Self {
            device_path,
            domain,
            id: id.to_owned(),
            name: record.name.unwrap_or_default(),
            device_type: record.device_type,
            uniqueid: record.uniqueid,
            state: record.state,
            config: record.config,
            extra: record.extra,
        }
    }

    /// A bare device carrying only its identity, for events about
    /// devices the catalog has not seen yet.
    pub fn placeholder(domain: Domain, id: &str) -> Self {
        Self {
            device_path: Self::path_for(&domain, id, None),
            domain,
            id: id.to_owned(),
            name: String::new(),
            device_type: None,
            uniqueid: None,
            state: Map::new(),
            config: Map::new(),
            extra: Map::new(),
        }
    }

    /// Derive the device path for a record.
    pub fn path_for(domain: &Domain, id: &str, uniqueid: Option<&str>) -> String {
        match uniqueid.filter(|u| !u.is_empty()) {
            Some(uid) => format!("{domain}/uniqueid/{uid}"),
            None => format!("{domain}/device_id/{id}"),
        }
    }

    /// Resolve a dotted attribute path (`state.on`, `config.battery`,
    /// `name`, `modelid`, ...). Array elements are addressed by index.
    pub fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        let mut segments = path.split('.');
        let head = segments.next()?;

        let root: Cow<'_, Value> = match head {
            "name" => Cow::Owned(Value::String(self.name.clone())),
            "type" => Cow::Owned(Value::String(self.device_type.clone()?)),
            "uniqueid" => Cow::Owned(Value::String(self.uniqueid.clone()?)),
            "device_path" | "domain_path" => Cow::Owned(Value::String(self.device_path.clone())),
            "domain" => Cow::Owned(Value::String(self.domain.to_string())),
            "id" => Cow::Owned(Value::String(self.id.clone())),
            "state" | "config" => {
                let map = if head == "state" { &self.state } else { &self.config };
                return match segments.next() {
                    None => Some(Cow::Owned(Value::Object(map.clone()))),
                    Some(key) => descend(map.get(key)?, segments).map(Cow::Borrowed),
                };
            }
            other => return descend(self.extra.get(other)?, segments).map(Cow::Borrowed),
        };

        // Scalar roots have no children.
        match segments.next() {
            None => Some(root),
            Some(_) => None,
        }
    }
}

fn descend<'a, 'p>(
    mut value: &'a Value,
    segments: impl Iterator<Item = &'p str>,
) -> Option<&'a Value> {
    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

// ── DevicePatch ──────────────────────────────────────────────────────

/// Partial update carried by a delta message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub state: Option<Map<String, Value>>,
    pub config: Option<Map<String, Value>>,
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.state.is_none() && self.config.is_none()
    }
}

impl From<&GatewayEvent> for DevicePatch {
    fn from(event: &GatewayEvent) -> Self {
        Self {
            name: event.name.clone(),
            state: event.state.clone(),
            config: event.config.clone(),
        }
    }
}

// ── ChangeSet ────────────────────────────────────────────────────────

/// Ordered list of attribute paths altered by a patch
/// (`name`, `state.on`, `config.battery`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet(Vec<String>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>) {
        self.0.push(path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.iter().any(|p| p == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn light() -> Device {
        let record: DeviceRecord = serde_json::from_value(json!({
            "name": "Hall",
            "type": "Extended color light",
            "uniqueid": "00:17:88:01:00:bd:c7:b9-0b",
            "modelid": "LCT015",
            "state": { "on": false, "bri": 120, "xy": [0.3, 0.4] },
            "config": { "reachable": true }
        }))
        .unwrap();
        Device::from_record(Domain::Lights, "1", record)
    }

    #[test]
    fn path_prefers_uniqueid() {
        assert_eq!(light().device_path, "lights/uniqueid/00:17:88:01:00:bd:c7:b9-0b");
        assert_eq!(Device::path_for(&Domain::Groups, "7", None), "groups/device_id/7");
        assert_eq!(
            Device::path_for(&Domain::Sensors, "3", Some("")),
            "sensors/device_id/3"
        );
    }

    #[test]
    fn lookup_resolves_nested_attributes() {
        let device = light();
        assert_eq!(device.lookup("state.on").unwrap().as_ref(), &json!(false));
        assert_eq!(device.lookup("state.xy.1").unwrap().as_ref(), &json!(0.4));
        assert_eq!(device.lookup("name").unwrap().as_ref(), &json!("Hall"));
        assert_eq!(device.lookup("modelid").unwrap().as_ref(), &json!("LCT015"));
        assert_eq!(device.lookup("domain").unwrap().as_ref(), &json!("lights"));
        assert!(device.lookup("state.missing").is_none());
        assert!(device.lookup("name.first").is_none());
        assert!(device.lookup("state.xy.9").is_none());
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn domain_roundtrips_through_strings() {
        assert_eq!(Domain::from("groups"), Domain::Groups);
        assert_eq!(Domain::from("scenes"), Domain::Other("scenes".into()));
        assert_eq!(Domain::Sensors.to_string(), "sensors");
    }
}
