// ── Bridge abstraction ──
//
// Full lifecycle management for one gateway connection: the discovery
// poll task, the event stream connector and the router task that
// serializes both input streams into catalog mutation and fan-out.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use hubflow_api::{EventSocket, GatewayClient, SocketSignal};

use crate::config::{BridgeConfig, MIN_POLL_INTERVAL};
use crate::connection::ConnectionState;
use crate::directory::{ChannelDirectory, ListenerDirectory};
use crate::error::CoreError;
use crate::model::Device;
use crate::query::Query;
use crate::router::{Effect, EventRouter, RouterInput};
use crate::subscription::{ListenerId, Subscription};

const INPUT_CHANNEL_SIZE: usize = 1024;

/// Event stream port used when neither the profile nor the gateway
/// names one.
const DEFAULT_WEBSOCKET_PORT: u16 = 443;

// ── Bridge ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<BridgeInner>`. Created idle; call
/// [`start()`](Self::start) to spawn the poll and router tasks.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    client: GatewayClient,
    router: Mutex<EventRouter>,
    input_tx: mpsc::Sender<RouterInput>,
    input_rx: Mutex<Option<mpsc::Receiver<RouterInput>>>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    socket: Mutex<Option<EventSocket>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Create a bridge delivering notices through `directory`. Does NOT
    /// connect.
    pub fn new(
        config: BridgeConfig,
        directory: Arc<dyn ListenerDirectory>,
    ) -> Result<Self, CoreError> {
        let client = GatewayClient::new(
            config.url.clone(),
            config.api_key.clone(),
            &config.transport(),
        )?;
        let (connection_state, _) = watch::channel(ConnectionState::default());
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                client,
                router: Mutex::new(EventRouter::new(directory)),
                input_tx,
                input_rx: Mutex::new(Some(input_rx)),
                connection_state,
                cancel: CancellationToken::new(),
                socket: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the router and discovery poll tasks.
    ///
    /// The first fetch happens after the configured startup delay; the
    /// event stream is started once the catalog first becomes valid.
    pub async fn start(&self) -> Result<(), CoreError> {
        let Some(rx) = self.inner.input_rx.lock().await.take() else {
            return Err(CoreError::Internal("bridge already started".into()));
        };

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(router_task(self.clone(), rx)));
        handles.push(tokio::spawn(poll_task(self.clone())));

        info!(
            gateway = %self.inner.config.url,
            interval_secs = self.inner.config.effective_poll_interval().as_secs(),
            "bridge started"
        );
        Ok(())
    }

    /// Stop every background task, drop all subscriptions and reset the
    /// connection state.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(socket) = self.inner.socket.lock().await.take() {
            socket.shutdown();
        }

        // Tasks may register follow-up tasks while winding down, so the
        // lock is never held across a join.
        loop {
            let handles = std::mem::take(&mut *self.inner.task_handles.lock().await);
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }

        self.inner.router.lock().await.reset();
        self.inner
            .connection_state
            .send_replace(ConnectionState::default());
        debug!("bridge stopped");
    }

    /// One-shot: load the catalog once, run closure, shut down.
    ///
    /// Used by the CLI, which needs a single snapshot and no event stream.
    pub async fn oneshot<F, Fut, T>(config: BridgeConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Bridge) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let bridge = Bridge::new(config, Arc::new(ChannelDirectory::new()))?;
        let result = match bridge.load_once().await {
            Ok(_) => f(bridge.clone()).await,
            Err(e) => Err(e),
        };
        bridge.shutdown().await;
        result
    }

    /// Fetch a snapshot and apply it inline, without background tasks.
    /// Returns the number of catalogued devices.
    pub async fn load_once(&self) -> Result<usize, CoreError> {
        if !self.claim_refresh().await {
            return Err(CoreError::Internal("a refresh is already in flight".into()));
        }

        let result = self.inner.client.fetch_snapshot().await;

        let mut router = self.inner.router.lock().await;
        let outcome = match result {
            Ok(full) => {
                // Effects are for the running bridge; a one-shot load has no
                // stream to start.
                let _ = router.handle(RouterInput::Discovery(Ok(full.into_domains())));
                Ok(router.catalog().len())
            }
            Err(e) => {
                router.handle(RouterInput::Discovery(Err(e.to_string())));
                Err(CoreError::from(e))
            }
        };
        self.inner
            .connection_state
            .send_replace(router.state().clone());
        outcome
    }

    /// Fetch a fresh snapshot and queue it for the router.
    ///
    /// Returns `false` without fetching when a refresh is already in
    /// flight.
    pub async fn request_refresh(&self) -> bool {
        if !self.claim_refresh().await {
            debug!("refresh already in flight, skipping");
            return false;
        }

        let input = match self.inner.client.fetch_snapshot().await {
            Ok(full) => RouterInput::Discovery(Ok(full.into_domains())),
            Err(e) => RouterInput::Discovery(Err(e.to_string())),
        };
        if self.inner.input_tx.send(input).await.is_err() {
            debug!("router stopped, discarding discovery result");
        }
        true
    }

    async fn claim_refresh(&self) -> bool {
        let mut router = self.inner.router.lock().await;
        let claimed = router.begin_refresh();
        if claimed {
            self.inner
                .connection_state
                .send_replace(router.state().clone());
        }
        claimed
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub async fn register_path(&self, listener: ListenerId, device_path: impl Into<String>) -> bool {
        self.subscribe(Subscription::Path {
            listener,
            device_path: device_path.into(),
        })
        .await
    }

    pub async fn deregister_path(&self, listener: &ListenerId, device_path: &str) -> bool {
        let mut router = self.inner.router.lock().await;
        router.registry_mut().deregister_path(listener, device_path)
    }

    pub async fn register_query(&self, listener: ListenerId, query: Query) -> bool {
        self.subscribe(Subscription::Query { listener, query }).await
    }

    pub async fn deregister_query(&self, listener: &ListenerId) -> bool {
        let mut router = self.inner.router.lock().await;
        router.registry_mut().deregister_query(listener)
    }

    pub async fn register_raw(&self, listener: ListenerId) -> bool {
        self.subscribe(Subscription::Raw { listener }).await
    }

    pub async fn deregister_raw(&self, listener: &ListenerId) -> bool {
        let mut router = self.inner.router.lock().await;
        router.registry_mut().deregister_raw(listener)
    }

    /// Drop every subscription held by `listener`.
    pub async fn remove_listener(&self, listener: &ListenerId) -> usize {
        let mut router = self.inner.router.lock().await;
        router.registry_mut().remove_listener(listener)
    }

    async fn subscribe(&self, subscription: Subscription) -> bool {
        let mut router = self.inner.router.lock().await;
        router.subscribe(subscription)
    }

    // ── Catalog access ───────────────────────────────────────────────

    pub async fn device_by_path(&self, path: &str) -> Option<Device> {
        let router = self.inner.router.lock().await;
        router.catalog().get_by_path(path).cloned()
    }

    /// Devices matching `query`, in catalog order.
    pub async fn devices(&self, query: &Query) -> Result<Vec<Device>, CoreError> {
        let router = self.inner.router.lock().await;
        let matches = router.catalog().query(query)?;
        Ok(matches.into_iter().cloned().collect())
    }

    pub async fn device_count(&self) -> usize {
        self.inner.router.lock().await.catalog().len()
    }

    // ── State observation ────────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.connection_state.borrow().ready
    }

    // ── Event stream ─────────────────────────────────────────────────

    async fn start_event_stream(&self) {
        let mut socket = self.inner.socket.lock().await;
        if socket.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }

        let url = match self.event_stream_url().await {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "cannot determine event stream address");
                return;
            }
        };

        info!(%url, "starting event stream");
        let (handle, rx) =
            EventSocket::spawn(url, self.inner.config.socket(), self.inner.cancel.child_token());
        *socket = Some(handle);
        drop(socket);

        let forwarder = tokio::spawn(forward_signals(self.clone(), rx));
        self.track(forwarder).await;
    }

    /// Keep `handle` for shutdown, dropping handles of tasks that already
    /// finished so the list stays bounded on a long-running bridge.
    async fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    async fn event_stream_url(&self) -> Result<Url, CoreError> {
        let config = &self.inner.config;
        let port = match config.websocket_port {
            Some(port) => port,
            None => match self.inner.client.fetch_gateway_config().await {
                Ok(gateway) => gateway.websocketport.unwrap_or_else(|| {
                    warn!("gateway reports no event stream port, using default");
                    DEFAULT_WEBSOCKET_PORT
                }),
                Err(e) => {
                    warn!(error = %e, "cannot read gateway config, using default event stream port");
                    DEFAULT_WEBSOCKET_PORT
                }
            },
        };
        stream_url(&config.url, port, config.secure_websocket)
    }
}

/// Event stream address on the gateway's host.
fn stream_url(base: &Url, port: u16, secure: bool) -> Result<Url, CoreError> {
    let host = base.host_str().ok_or_else(|| CoreError::Config {
        message: format!("gateway URL {base} has no host"),
    })?;
    let scheme = if secure { "wss" } else { "ws" };
    Url::parse(&format!("{scheme}://{host}:{port}")).map_err(|e| CoreError::Config {
        message: format!("invalid event stream URL: {e}"),
    })
}

// ── Background tasks ─────────────────────────────────────────────────

/// Fixed-interval discovery after the startup delay.
async fn poll_task(bridge: Bridge) {
    let cancel = bridge.inner.cancel.clone();
    let config = &bridge.inner.config;

    if config.poll_interval < MIN_POLL_INTERVAL {
        warn!(
            configured_ms = u64::try_from(config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "poll interval below minimum, using default"
        );
    }
    let period = config.effective_poll_interval();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(config.startup_delay) => {}
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = bridge.request_refresh() => {}
                }
            }
        }
    }
}

/// Single consumer of discovery results and stream signals.
async fn router_task(bridge: Bridge, mut rx: mpsc::Receiver<RouterInput>) {
    let cancel = bridge.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            input = rx.recv() => {
                let Some(input) = input else { break };
                let effects = {
                    let mut router = bridge.inner.router.lock().await;
                    let effects = router.handle(input);
                    bridge.inner.connection_state.send_replace(router.state().clone());
                    effects
                };
                for effect in effects {
                    run_effect(&bridge, effect).await;
                }
            }
        }
    }
}

async fn run_effect(bridge: &Bridge, effect: Effect) {
    let worker = bridge.clone();
    let cancel = bridge.inner.cancel.clone();
    let handle = match effect {
        Effect::StartEventStream => tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                () = worker.start_event_stream() => {}
            }
        }),
        Effect::RequestRefresh => tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = worker.request_refresh() => {}
            }
        }),
    };
    bridge.track(handle).await;
}

/// Pump connector signals into the router input channel.
async fn forward_signals(bridge: Bridge, mut rx: mpsc::Receiver<SocketSignal>) {
    let cancel = bridge.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            signal = rx.recv() => {
                let Some(signal) = signal else { break };
                if bridge.inner.input_tx.send(RouterInput::Stream(signal)).await.is_err() {
                    break;
                }
            }
        }
    }
}
