// hubflow-core: Device catalog, query engine and event routing between
// hubflow-api and listener collaborators.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod model;
pub mod poller;
pub mod query;
pub mod router;
pub mod store;
pub mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::Bridge;
pub use config::{BridgeConfig, TlsVerification};
pub use connection::{ConnectionState, StreamState};
pub use directory::{ChannelDirectory, Delivery, ListenerDirectory};
pub use error::CoreError;
pub use poller::{DiscoveryPhase, DiscoveryState};
pub use query::{Outcome, Pattern, Query, QueryError};
pub use router::{Effect, EventRouter, MessageOutcome, RouterInput};
pub use store::{DeviceCatalog, Snapshot};
pub use subscription::{ListenerId, ListenerKind, Subscription, SubscriptionRegistry};

pub use model::{ChangeSet, Device, DevicePatch, Diagnostic, Domain, ErrorNotice, Notice};
