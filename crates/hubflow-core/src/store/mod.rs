// ── Device catalog ──
//
// Authoritative in-memory view of gateway devices, rebuilt from each
// discovery snapshot and patched in place by delta messages.

mod catalog;

pub use catalog::{DeviceCatalog, Snapshot};
