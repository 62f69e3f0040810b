// ── Listener directory ──
//
// Resolves listener ids to something that can take a notice. The router
// only ever asks the directory; an unresolvable id means the listener
// is gone and its subscription gets pruned.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::model::Notice;
use crate::subscription::ListenerId;

/// Result of handing a notice to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No live listener behind this id.
    Unresolved,
}

/// Lookup from listener id to a live listener.
pub trait ListenerDirectory: Send + Sync {
    fn deliver(&self, listener: &ListenerId, notice: Notice) -> Delivery;
}

/// Directory backed by unbounded channels, one per attached listener.
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    listeners: DashMap<ListenerId, mpsc::UnboundedSender<Notice>>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener, replacing any previous attachment under `id`.
    pub fn attach(&self, id: ListenerId) -> mpsc::UnboundedReceiver<Notice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(id, tx);
        rx
    }

    pub fn detach(&self, id: &ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn contains(&self, id: &ListenerId) -> bool {
        self.listeners.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl ListenerDirectory for ChannelDirectory {
    fn deliver(&self, listener: &ListenerId, notice: Notice) -> Delivery {
        // Clone the sender so no shard lock is held across removal.
        let Some(tx) = self.listeners.get(listener).map(|entry| entry.value().clone()) else {
            return Delivery::Unresolved;
        };
        if tx.send(notice).is_ok() {
            return Delivery::Delivered;
        }
        debug!(%listener, "listener receiver dropped, detaching");
        self.listeners.remove(listener);
        Delivery::Unresolved
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Diagnostic;

    fn notice() -> Notice {
        Notice::Diagnostic(Diagnostic::device_not_found("x"))
    }

    #[test]
    fn attached_listener_receives() {
        let directory = ChannelDirectory::new();
        let mut rx = directory.attach("a".into());
        assert_eq!(directory.deliver(&"a".into(), notice()), Delivery::Delivered);
        assert!(matches!(rx.try_recv().unwrap(), Notice::Diagnostic(_)));
    }

    #[test]
    fn unknown_listener_is_unresolved() {
        let directory = ChannelDirectory::new();
        assert_eq!(directory.deliver(&"nobody".into(), notice()), Delivery::Unresolved);
    }

    #[test]
    fn dropped_receiver_is_detached() {
        let directory = ChannelDirectory::new();
        drop(directory.attach("a".into()));
        assert_eq!(directory.deliver(&"a".into(), notice()), Delivery::Unresolved);
        assert!(!directory.contains(&"a".into()));
        assert!(directory.is_empty());
    }
}
