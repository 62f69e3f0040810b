// ── Event router ──
//
// Single consumer of discovery results and event stream signals. Each
// input is handled to completion inside one `&mut self` call: catalog
// mutation, diff and fan-out for one input never interleave with another.
// Recipients are computed up front for every pass, so a subscription
// pruned mid-pass does not change who else receives that pass.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use hubflow_api::{EventKind, GatewayEvent, SocketSignal};

use crate::connection::ConnectionState;
use crate::directory::{Delivery, ListenerDirectory};
use crate::model::notice::INVALID_QUERY;
use crate::model::{ChangeSet, Device, DevicePatch, Diagnostic, Domain, ErrorNotice, Notice};
use crate::query::{Query, QueryError};
use crate::store::{DeviceCatalog, Snapshot};
use crate::subscription::{Subscription, SubscriptionRegistry};

/// Error code for bootstrap fetch failures.
pub const GATEWAY_UNREACHABLE: &str = "GATEWAY_UNREACHABLE";
/// Error code for event stream transport errors.
pub const SOCKET_ERROR: &str = "SOCKET_ERROR";
/// Error code for a silent event stream.
pub const HEARTBEAT_TIMEOUT: &str = "HEARTBEAT_TIMEOUT";
/// Error code for a refused event stream upgrade.
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";

// ── Inputs and effects ───────────────────────────────────────────────

/// One unit of work for the router.
#[derive(Debug, Clone)]
pub enum RouterInput {
    /// Outcome of a discovery fetch; the error carries a printable reason.
    Discovery(Result<Snapshot, String>),
    Stream(SocketSignal),
}

/// Follow-up work the async side must perform after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The catalog became valid for the first time.
    StartEventStream,
    /// Catalog membership changed; fetch a fresh snapshot.
    RequestRefresh,
}

/// How a delta message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Arrived before the catalog was valid.
    Dropped,
    /// Target device not in the catalog; a diagnostic was emitted.
    Unresolved,
    /// Add/delete: forwarded to raw subscribers, refresh requested.
    Membership,
    /// Patched and fanned out.
    Dispatched { changed: ChangeSet, delivered: usize },
}

type Plan = Vec<(Subscription, Notice)>;

// ── EventRouter ──────────────────────────────────────────────────────

pub struct EventRouter {
    catalog: DeviceCatalog,
    registry: SubscriptionRegistry,
    state: ConnectionState,
    directory: Arc<dyn ListenerDirectory>,
}

impl EventRouter {
    pub fn new(directory: Arc<dyn ListenerDirectory>) -> Self {
        Self {
            catalog: DeviceCatalog::new(),
            registry: SubscriptionRegistry::new(),
            state: ConnectionState::default(),
            directory,
        }
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Claim the single discovery slot. `false` means a fetch is already
    /// outstanding and the caller should do nothing.
    pub fn begin_refresh(&mut self) -> bool {
        self.state.discovery.begin_refresh()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register a subscription. When the catalog is already ready the
    /// new subscriber is primed with start notices right away.
    pub fn subscribe(&mut self, subscription: Subscription) -> bool {
        let added = self.registry.register(subscription.clone());
        if added && self.state.ready {
            let mut plan = Plan::new();
            self.plan_start(&subscription, &mut plan);
            self.dispatch(plan);
        }
        added
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        self.registry.remove(subscription)
    }

    pub fn registry_mut(&mut self) -> &mut SubscriptionRegistry {
        &mut self.registry
    }

    /// Forget every subscription and connection state (session teardown).
    pub fn reset(&mut self) {
        self.registry.clear();
        self.state = ConnectionState::default();
    }

    // ── Input handling ───────────────────────────────────────────────

    pub fn handle(&mut self, input: RouterInput) -> Vec<Effect> {
        match input {
            RouterInput::Discovery(Ok(snapshot)) => self.apply_snapshot(snapshot),
            RouterInput::Discovery(Err(reason)) => {
                self.apply_discovery_failure(&reason);
                Vec::new()
            }
            RouterInput::Stream(signal) => self.apply_signal(signal),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Vec<Effect> {
        self.catalog.parse(snapshot);
        let transition = self.state.discovery.complete_success(Utc::now());

        if transition.recovered {
            info!(devices = self.catalog.len(), "gateway reachable again");
        }
        if !transition.first_valid {
            return Vec::new();
        }

        info!(devices = self.catalog.len(), "device catalog ready");
        self.state.ready = true;
        self.fan_out_start();
        vec![Effect::StartEventStream]
    }

    pub fn apply_discovery_failure(&mut self, detail: &str) {
        let report = self.state.discovery.complete_failure();
        let fail_count = self.state.discovery.fail_count;

        if report.log {
            error!(fail_count, error = %detail, "{}", report.reason);
        } else {
            debug!(fail_count, error = %detail, "discovery fetch failed");
        }
        if report.notify {
            self.fan_out_error(GATEWAY_UNREACHABLE, report.reason, true);
        }
    }

    pub fn apply_signal(&mut self, signal: SocketSignal) -> Vec<Effect> {
        let now = Utc::now();
        let mut effects = Vec::new();

        match signal {
            SocketSignal::Open => {
                let reconnect = self.state.stream.connections > 0;
                self.state.stream.on_open(now);
                info!(reconnect, "event stream connected");
                if reconnect && self.state.ready {
                    self.fan_out_start();
                }
            }
            SocketSignal::Message { event, raw } => {
                self.state.stream.on_message(now);
                self.route_event(&event, &raw, &mut effects);
            }
            SocketSignal::Malformed { reason, raw } => {
                self.state.stream.on_message(now);
                warn!(%reason, bytes = raw.len(), "dropping malformed event stream message");
            }
            SocketSignal::Error { reason } => {
                self.state.stream.on_disconnect(now);
                error!(%reason, "event stream error");
                if self.state.ready && !reason.is_empty() {
                    self.fan_out_error(SOCKET_ERROR, &format!("event stream error: {reason}"), false);
                }
            }
            SocketSignal::Closed { code, reason } => {
                self.state.stream.on_disconnect(now);
                if reason.is_empty() {
                    info!(code, "event stream closed");
                } else {
                    warn!(code, %reason, "event stream closed");
                    if self.state.ready {
                        self.fan_out_error(
                            &code.to_string(),
                            &format!("event stream closed: {reason}"),
                            false,
                        );
                    }
                }
            }
            SocketSignal::HeartbeatTimeout => {
                self.state.stream.on_disconnect(now);
                warn!("event stream heartbeat timed out");
                if self.state.ready {
                    self.fan_out_error(HEARTBEAT_TIMEOUT, "no data from the event stream", false);
                }
            }
            SocketSignal::Unauthorized => {
                self.state.stream.on_unauthorized(now);
                warn!("event stream rejected the API key");
                if self.state.ready {
                    self.fan_out_error(UNAUTHORIZED, "event stream authentication failed", false);
                }
            }
        }

        effects
    }

    /// Resolve, patch and fan out one delta message.
    pub fn route_event(
        &mut self,
        event: &GatewayEvent,
        raw: &Arc<Value>,
        effects: &mut Vec<Effect>,
    ) -> MessageOutcome {
        if !self.state.discovery.valid {
            error!(
                kind = ?event.kind,
                resource = %event.resource,
                "event received before the device catalog is ready, dropping"
            );
            return MessageOutcome::Dropped;
        }

        let membership = event.kind.alters_membership();
        if membership {
            info!(kind = ?event.kind, resource = %event.resource, "device membership changed");
            effects.push(Effect::RequestRefresh);
        }

        // Scene invocations address the group that owns the scene.
        let (domain, id) = match event.kind {
            EventKind::SceneCalled => (Domain::Groups, event.gid.as_deref()),
            _ => (Domain::from(event.resource.as_str()), event.id.as_deref()),
        };

        let resolved = id.and_then(|id| self.catalog.get_by_domain_id(&domain, id));

        if membership {
            // A freshly added device is normally not catalogued yet; raw
            // subscribers still see the event, with a placeholder snapshot.
            let snapshot = match resolved {
                Some(device) => device.clone(),
                None => {
                    let id = id.unwrap_or_default();
                    debug!(%domain, id, "membership event for uncatalogued device");
                    Device::placeholder(domain, id)
                }
            };
            let notice = Notice::Change {
                device: Arc::new(snapshot),
                changed: ChangeSet::new(),
                raw_event: Arc::clone(raw),
            };
            let plan = self.raw_plan(&notice);
            self.dispatch(plan);
            return MessageOutcome::Membership;
        }

        let Some(device) = resolved else {
            let target = format!("{domain}/{}", id.unwrap_or("<none>"));
            error!(%target, kind = ?event.kind, "event for unknown device");
            let diagnostic = Notice::Diagnostic(Diagnostic::device_not_found(&target));
            let plan = self
                .registry
                .raw_subscribers()
                .map(|l| (Subscription::Raw { listener: l.clone() }, diagnostic.clone()))
                .collect();
            self.dispatch(plan);
            return MessageOutcome::Unresolved;
        };

        let path = device.device_path.clone();

        let changed = self
            .catalog
            .apply_patch(&path, &DevicePatch::from(event))
            .unwrap_or_default();
        let Some(device) = self.catalog.get_by_path(&path) else {
            return MessageOutcome::Unresolved;
        };

        let snapshot = Arc::new(device.clone());
        let notice = Notice::Change {
            device: Arc::clone(&snapshot),
            changed: changed.clone(),
            raw_event: Arc::clone(raw),
        };

        let mut plan = Plan::new();
        for listener in self.registry.path_subscribers(&path) {
            plan.push((
                Subscription::Path {
                    listener: listener.clone(),
                    device_path: path.clone(),
                },
                notice.clone(),
            ));
        }
        for (listener, query) in self.registry.queries() {
            let subscription = Subscription::Query {
                listener: listener.clone(),
                query: query.clone(),
            };
            match query.evaluate(device) {
                Ok(outcome) if outcome.is_match() => plan.push((subscription, notice.clone())),
                Ok(_) => {}
                Err(e) => plan.push((
                    subscription,
                    invalid_query(Some(Arc::clone(&snapshot)), query, &e),
                )),
            }
        }
        plan.extend(self.raw_plan(&notice));

        debug!(
            path = %path,
            changed = changed.len(),
            recipients = plan.len(),
            "dispatching change"
        );
        let delivered = self.dispatch(plan);
        MessageOutcome::Dispatched { changed, delivered }
    }

    // ── Fan-out ──────────────────────────────────────────────────────

    /// Start notices to every path and query subscription.
    fn fan_out_start(&mut self) {
        let mut plan = Plan::new();
        for (path, listeners) in self.registry.paths() {
            for listener in listeners {
                let subscription = Subscription::Path {
                    listener: listener.clone(),
                    device_path: path.to_owned(),
                };
                self.plan_start(&subscription, &mut plan);
            }
        }
        for (listener, query) in self.registry.queries() {
            let subscription = Subscription::Query {
                listener: listener.clone(),
                query: query.clone(),
            };
            self.plan_start(&subscription, &mut plan);
        }
        debug!(recipients = plan.len(), "start fan-out");
        self.dispatch(plan);
    }

    fn plan_start(&self, subscription: &Subscription, plan: &mut Plan) {
        match subscription {
            Subscription::Path { device_path, .. } => {
                let notice = match self.catalog.get_by_path(device_path) {
                    Some(device) => Notice::start(Arc::new(device.clone())),
                    None => Notice::Diagnostic(Diagnostic::device_not_found(device_path)),
                };
                plan.push((subscription.clone(), notice));
            }
            Subscription::Query { query, .. } => match self.catalog.query(query) {
                Ok(devices) => plan.extend(devices.into_iter().map(|device| {
                    (subscription.clone(), Notice::start(Arc::new(device.clone())))
                })),
                Err(e) => plan.push((subscription.clone(), invalid_query(None, query, &e))),
            },
            Subscription::Raw { .. } => {}
        }
    }

    /// Error notices to every path and query subscription. Global errors
    /// also reach raw subscribers, and subscriptions with no resolvable
    /// device get a device-less notice instead of being skipped.
    fn fan_out_error(&mut self, code: &str, message: &str, is_global_error: bool) {
        let error_for = |device: Option<&Device>| {
            Notice::Error(ErrorNotice {
                device: device.map(|d| Arc::new(d.clone())),
                error_code: code.to_owned(),
                error_msg: message.to_owned(),
                is_global_error,
            })
        };

        let mut plan = Plan::new();
        for (path, listeners) in self.registry.paths() {
            let notice = match self.catalog.get_by_path(path) {
                Some(device) => error_for(Some(device)),
                None if is_global_error => error_for(None),
                None => Notice::Diagnostic(Diagnostic::device_not_found(path)),
            };
            for listener in listeners {
                plan.push((
                    Subscription::Path {
                        listener: listener.clone(),
                        device_path: path.to_owned(),
                    },
                    notice.clone(),
                ));
            }
        }
        for (listener, query) in self.registry.queries() {
            let subscription = Subscription::Query {
                listener: listener.clone(),
                query: query.clone(),
            };
            match self.catalog.query(query) {
                Ok(devices) if devices.is_empty() && is_global_error => {
                    plan.push((subscription, error_for(None)));
                }
                Ok(devices) => plan.extend(
                    devices
                        .into_iter()
                        .map(|device| (subscription.clone(), error_for(Some(device)))),
                ),
                Err(e) => plan.push((subscription, invalid_query(None, query, &e))),
            }
        }
        if is_global_error {
            plan.extend(self.raw_plan(&error_for(None)));
        }
        debug!(code, recipients = plan.len(), is_global_error, "error fan-out");
        self.dispatch(plan);
    }

    fn raw_plan(&self, notice: &Notice) -> Plan {
        self.registry
            .raw_subscribers()
            .map(|l| (Subscription::Raw { listener: l.clone() }, notice.clone()))
            .collect()
    }

    /// Deliver a precomputed plan; prune subscriptions whose listener no
    /// longer resolves. Returns the number of notices delivered.
    fn dispatch(&mut self, plan: Plan) -> usize {
        let mut delivered = 0;
        for (subscription, notice) in plan {
            match self.directory.deliver(subscription.listener(), notice) {
                Delivery::Delivered => delivered += 1,
                Delivery::Unresolved => {
                    warn!(
                        listener = %subscription.listener(),
                        kind = %subscription.kind(),
                        "listener no longer resolves, removing subscription"
                    );
                    self.registry.remove(&subscription);
                }
            }
        }
        delivered
    }
}

fn invalid_query(device: Option<Arc<Device>>, query: &Query, err: &QueryError) -> Notice {
    let predicate = serde_json::to_string(query).unwrap_or_else(|_| format!("{query:?}"));
    warn!(error = %err, %predicate, "query cannot be evaluated");
    Notice::Error(ErrorNotice {
        device,
        error_code: INVALID_QUERY.to_owned(),
        error_msg: format!("{err}: {predicate}"),
        is_global_error: false,
    })
}
