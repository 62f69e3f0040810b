use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use hubflow_api::DeviceRecord;

use crate::model::{ChangeSet, Device, DevicePatch, Domain, values_equal};
use crate::query::{Query, QueryError};

/// Domain-keyed device records as fetched from the gateway.
pub type Snapshot = IndexMap<String, IndexMap<String, DeviceRecord>>;

/// Devices keyed by device path, in snapshot order, with a secondary
/// `(domain, id)` index for resolving delta messages.
#[derive(Debug, Default)]
pub struct DeviceCatalog {
    devices: IndexMap<String, Device>,
    by_domain_id: HashMap<(Domain, String), String>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog contents with a fresh snapshot.
    ///
    /// Devices whose path collides with an earlier record fall back to
    /// their id-based path so every path stays unique.
    pub fn parse(&mut self, snapshot: Snapshot) {
        self.devices.clear();
        self.by_domain_id.clear();

        for (domain_name, records) in snapshot {
            let domain = Domain::from(domain_name);
            for (id, record) in records {
                let mut device = Device::from_record(domain.clone(), &id, record);
                if self.devices.contains_key(&device.device_path) {
                    let fallback = Device::path_for(&domain, &id, None);
                    warn!(
                        path = %device.device_path,
                        fallback = %fallback,
                        "duplicate device path in snapshot"
                    );
                    device.device_path = fallback;
                }
                self.by_domain_id
                    .insert((domain.clone(), id), device.device_path.clone());
                self.devices.insert(device.device_path.clone(), device);
            }
        }

        debug!(devices = self.devices.len(), "catalog rebuilt");
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get_by_path(&self, path: &str) -> Option<&Device> {
        self.devices.get(path)
    }

    pub fn get_by_domain_id(&self, domain: &Domain, id: &str) -> Option<&Device> {
        let path = self.by_domain_id.get(&(domain.clone(), id.to_owned()))?;
        self.devices.get(path)
    }

    /// All devices satisfying `query`, in catalog order.
    pub fn query(&self, query: &Query) -> Result<Vec<&Device>, QueryError> {
        let mut matches = Vec::new();
        for device in self.devices.values() {
            if query.is_match(device)? {
                matches.push(device);
            }
        }
        Ok(matches)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Merge a patch into the device at `path`.
    ///
    /// Returns the attribute paths whose value actually changed, in
    /// `name`, `state.*`, `config.*` order, or `None` for an unknown path.
    pub fn apply_patch(&mut self, path: &str, patch: &DevicePatch) -> Option<ChangeSet> {
        let device = self.devices.get_mut(path)?;
        let mut changed = ChangeSet::new();

        if let Some(name) = &patch.name {
            if *name != device.name {
                device.name.clone_from(name);
                changed.push("name");
            }
        }
        if let Some(state) = &patch.state {
            merge(&mut device.state, state, "state", &mut changed);
        }
        if let Some(config) = &patch.config {
            merge(&mut device.config, config, "config", &mut changed);
        }

        Some(changed)
    }
}

fn merge(
    target: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    prefix: &str,
    changed: &mut ChangeSet,
) {
    for (key, value) in patch {
        let differs = target.get(key).is_none_or(|current| !values_equal(current, value));
        if differs {
            target.insert(key.clone(), value.clone());
            changed.push(format!("{prefix}.{key}"));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn snapshot() -> Snapshot {
        let full: hubflow_api::FullState = serde_json::from_value(json!({
            "lights": {
                "1": { "name": "L1", "uniqueid": "aa:bb-01", "state": { "on": false, "bri": 10 } },
                "2": { "name": "L2", "state": { "on": true } }
            },
            "sensors": {
                "3": { "name": "S1", "uniqueid": "cc:dd-02", "state": { "buttonevent": 1002 },
                       "config": { "battery": 90 } }
            },
            "groups": {
                "7": { "name": "Living", "state": { "any_on": false } }
            }
        }))
        .unwrap();
        full.into_domains()
    }

    fn catalog() -> DeviceCatalog {
        let mut catalog = DeviceCatalog::new();
        catalog.parse(snapshot());
        catalog
    }

    #[test]
    fn parse_indexes_by_path_and_domain_id() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.get_by_path("lights/uniqueid/aa:bb-01").unwrap().name, "L1");
        assert_eq!(catalog.get_by_path("lights/device_id/2").unwrap().name, "L2");
        assert_eq!(
            catalog.get_by_domain_id(&Domain::Groups, "7").unwrap().device_path,
            "groups/device_id/7"
        );
        assert!(catalog.get_by_domain_id(&Domain::Lights, "9").is_none());
        assert!(catalog.get_by_path("lights/device_id/9").is_none());
    }

    #[test]
    fn parse_replaces_previous_contents() {
        let mut catalog = catalog();
        let mut next = Snapshot::new();
        next.insert("lights".into(), IndexMap::new());
        catalog.parse(next);
        assert!(catalog.is_empty());
        assert!(catalog.get_by_domain_id(&Domain::Lights, "1").is_none());
    }

    #[test]
    fn duplicate_uniqueid_falls_back_to_id_path() {
        let full: hubflow_api::FullState = serde_json::from_value(json!({
            "sensors": {
                "3": { "name": "A", "uniqueid": "same" },
                "4": { "name": "B", "uniqueid": "same" }
            }
        }))
        .unwrap();
        let mut catalog = DeviceCatalog::new();
        catalog.parse(full.into_domains());

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get_by_path("sensors/uniqueid/same").unwrap().name, "A");
        assert_eq!(catalog.get_by_path("sensors/device_id/4").unwrap().name, "B");
    }

    #[test]
    fn patch_reports_only_real_changes() {
        let mut catalog = catalog();
        let patch = DevicePatch {
            state: Some(json!({ "on": true, "bri": 10 }).as_object().unwrap().clone()),
            ..DevicePatch::default()
        };

        let changed = catalog.apply_patch("lights/uniqueid/aa:bb-01", &patch).unwrap();
        assert_eq!(changed.as_slice(), ["state.on"]);
        assert_eq!(
            catalog.get_by_path("lights/uniqueid/aa:bb-01").unwrap().state["on"],
            json!(true)
        );

        let again = catalog.apply_patch("lights/uniqueid/aa:bb-01", &patch).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn patch_orders_name_state_config() {
        let mut catalog = catalog();
        let patch = DevicePatch {
            name: Some("Button".into()),
            state: Some(json!({ "buttonevent": 2002 }).as_object().unwrap().clone()),
            config: Some(json!({ "battery": 85, "reachable": true }).as_object().unwrap().clone()),
        };

        let changed = catalog.apply_patch("sensors/uniqueid/cc:dd-02", &patch).unwrap();
        assert_eq!(
            changed.as_slice(),
            ["name", "state.buttonevent", "config.battery", "config.reachable"]
        );
    }

    #[test]
    fn patch_on_unknown_path_is_none() {
        let mut catalog = catalog();
        assert!(catalog.apply_patch("lights/device_id/99", &DevicePatch::default()).is_none());
    }

    #[test]
    fn query_returns_matches_in_catalog_order() {
        let catalog = catalog();
        let on = catalog.query(&Query::eq("state.on", true)).unwrap();
        assert_eq!(on.len(), 1);
        assert_eq!(on[0].name, "L2");

        let lights = catalog.query(&Query::eq("domain", "lights")).unwrap();
        let names: Vec<_> = lights.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["L1", "L2"]);

        assert!(catalog.query(&Query::gt("state.bri", "x")).is_err());
    }
}
