// ── Bridge domain model ──
//
// Canonical representation of gateway devices and of the notices the
// bridge hands to listeners. Built from `hubflow_api` wire records.

pub mod device;
pub mod notice;

pub use device::{ChangeSet, Device, DevicePatch, Domain, values_equal};
pub use notice::{Diagnostic, ErrorNotice, Notice};
