// ── Subscription registry ──
//
// Who wants to hear about what. Listeners are referenced by id only;
// resolving an id to something deliverable is the directory's job.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::query::Query;

/// Opaque listener identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(String);

impl ListenerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListenerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ListenerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ListenerKind {
    /// Follows one device path.
    Path,
    /// Follows every device matching a query.
    Query,
    /// Receives every delta message.
    Raw,
}

/// One registration.
#[derive(Debug, Clone, PartialEq)]
pub enum Subscription {
    Path {
        listener: ListenerId,
        device_path: String,
    },
    Query {
        listener: ListenerId,
        query: Query,
    },
    Raw {
        listener: ListenerId,
    },
}

impl Subscription {
    pub fn listener(&self) -> &ListenerId {
        match self {
            Self::Path { listener, .. } | Self::Query { listener, .. } | Self::Raw { listener } => {
                listener
            }
        }
    }

    pub fn kind(&self) -> ListenerKind {
        match self {
            Self::Path { .. } => ListenerKind::Path,
            Self::Query { .. } => ListenerKind::Query,
            Self::Raw { .. } => ListenerKind::Raw,
        }
    }
}

/// Path, query and raw subscriptions.
///
/// Path subscribers keep registration order per device; a listener
/// holds at most one query subscription.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_path: IndexMap<String, Vec<ListenerId>>,
    queries: IndexMap<ListenerId, Query>,
    raw: IndexSet<ListenerId>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Returns `false` if it was already present.
    ///
    /// A query registration for a listener that already has one replaces
    /// the previous query.
    pub fn register(&mut self, subscription: Subscription) -> bool {
        match subscription {
            Subscription::Path {
                listener,
                device_path,
            } => {
                let listeners = self.by_path.entry(device_path).or_default();
                if listeners.contains(&listener) {
                    return false;
                }
                listeners.push(listener);
                true
            }
            Subscription::Query { listener, query } => {
                self.queries.insert(listener, query).is_none()
            }
            Subscription::Raw { listener } => self.raw.insert(listener),
        }
    }

    /// Remove a subscription. The query payload is ignored: a listener's
    /// query subscription is removed whatever its predicate.
    pub fn remove(&mut self, subscription: &Subscription) -> bool {
        match subscription {
            Subscription::Path {
                listener,
                device_path,
            } => {
                let Some(listeners) = self.by_path.get_mut(device_path) else {
                    return false;
                };
                let before = listeners.len();
                listeners.retain(|l| l != listener);
                let removed = listeners.len() != before;
                if listeners.is_empty() {
                    self.by_path.shift_remove(device_path);
                }
                removed
            }
            Subscription::Query { listener, .. } => self.queries.shift_remove(listener).is_some(),
            Subscription::Raw { listener } => self.raw.shift_remove(listener),
        }
    }

    // ── Per-kind shorthands ─────────────────────────────────────────

    pub fn register_path(&mut self, listener: ListenerId, device_path: impl Into<String>) -> bool {
        self.register(Subscription::Path {
            listener,
            device_path: device_path.into(),
        })
    }

    pub fn deregister_path(&mut self, listener: &ListenerId, device_path: &str) -> bool {
        self.remove(&Subscription::Path {
            listener: listener.clone(),
            device_path: device_path.to_owned(),
        })
    }

    pub fn register_query(&mut self, listener: ListenerId, query: Query) -> bool {
        self.register(Subscription::Query { listener, query })
    }

    pub fn deregister_query(&mut self, listener: &ListenerId) -> bool {
        self.queries.shift_remove(listener).is_some()
    }

    pub fn register_raw(&mut self, listener: ListenerId) -> bool {
        self.register(Subscription::Raw { listener })
    }

    pub fn deregister_raw(&mut self, listener: &ListenerId) -> bool {
        self.raw.shift_remove(listener)
    }

    /// Drop every subscription held by `listener`. Returns how many.
    pub fn remove_listener(&mut self, listener: &ListenerId) -> usize {
        let mut removed = 0;
        self.by_path.retain(|_, listeners| {
            let before = listeners.len();
            listeners.retain(|l| l != listener);
            removed += before - listeners.len();
            !listeners.is_empty()
        });
        if self.queries.shift_remove(listener).is_some() {
            removed += 1;
        }
        if self.raw.shift_remove(listener) {
            removed += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.by_path.clear();
        self.queries.clear();
        self.raw.clear();
    }

    // ── Views ────────────────────────────────────────────────────────

    pub fn path_subscribers(&self, device_path: &str) -> &[ListenerId] {
        self.by_path
            .get(device_path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &[ListenerId])> {
        self.by_path
            .iter()
            .map(|(path, listeners)| (path.as_str(), listeners.as_slice()))
    }

    pub fn queries(&self) -> impl Iterator<Item = (&ListenerId, &Query)> {
        self.queries.iter()
    }

    pub fn raw_subscribers(&self) -> impl Iterator<Item = &ListenerId> {
        self.raw.iter()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.by_path.values().map(Vec::len).sum::<usize>() + self.queries.len() + self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn path(listener: &str, device_path: &str) -> Subscription {
        Subscription::Path {
            listener: listener.into(),
            device_path: device_path.into(),
        }
    }

    #[test]
    fn path_registration_is_idempotent_and_ordered() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.register(path("b", "lights/device_id/1")));
        assert!(registry.register(path("a", "lights/device_id/1")));
        assert!(!registry.register(path("b", "lights/device_id/1")));

        let ids: Vec<&str> = registry
            .path_subscribers("lights/device_id/1")
            .iter()
            .map(ListenerId::as_str)
            .collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn removing_last_path_listener_drops_the_key() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(path("a", "lights/device_id/1"));
        assert!(registry.remove(&path("a", "lights/device_id/1")));
        assert!(!registry.remove(&path("a", "lights/device_id/1")));
        assert_eq!(registry.paths().count(), 0);
        assert!(registry.path_subscribers("lights/device_id/1").is_empty());
    }

    #[test]
    fn query_registration_replaces() {
        let mut registry = SubscriptionRegistry::new();
        let listener = ListenerId::from("q");
        assert!(registry.register(Subscription::Query {
            listener: listener.clone(),
            query: Query::All,
        }));
        assert!(!registry.register(Subscription::Query {
            listener: listener.clone(),
            query: Query::exists("state.on"),
        }));
        let (_, query) = registry.queries().next().unwrap();
        assert_eq!(query, &Query::exists("state.on"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_listener_clears_every_kind() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(path("x", "lights/device_id/1"));
        registry.register(path("x", "sensors/device_id/3"));
        registry.register(path("y", "sensors/device_id/3"));
        registry.register(Subscription::Query {
            listener: "x".into(),
            query: Query::All,
        });
        registry.register(Subscription::Raw {
            listener: "x".into(),
        });

        assert_eq!(registry.remove_listener(&"x".into()), 4);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.paths().count(), 1);
        assert_eq!(registry.raw_subscribers().count(), 0);
    }

    #[test]
    fn clear_empties_everything() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(path("a", "p"));
        registry.register(Subscription::Raw {
            listener: "a".into(),
        });
        registry.clear();
        assert!(registry.is_empty());
    }
}
