// ── Controller abstraction ──
//
// Full lifecycle management for one Neviweb account. Owns the session,
// the device directory, the state cache and the write queue, runs the
// per-family poll tasks, and broadcasts state changes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use neviweb_api::{AttributeUpdate, NeviwebClient, SessionManager, TransportConfig};
use serde::Serialize;
use strum::IntoEnumIterator;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::DeviceStateCache;
use crate::config::ControllerConfig;
use crate::directory::DeviceDirectory;
use crate::error::CoreError;
use crate::model::{
    Device, DeviceFamily, DeviceState, DimmerUpdate, Location, SetpointMode, StateUpdate,
    SwitchUpdate, ThermostatUpdate,
};
use crate::throttle::{Priority, WriteThrottle};

const CHANGE_CHANNEL_SIZE: usize = 256;

/// Dimmer brightness writes are sent this many times in a row; a single
/// write is occasionally ignored by the device.
const INTENSITY_SUBMITS: usize = 2;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// A device's state differed from the last one seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub device_id: i64,
    pub previous: Option<DeviceState>,
    pub current: DeviceState,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Reads go through the
/// per-device cache, writes through the throttle, and both share one
/// session.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    client: NeviwebClient,
    directory: DeviceDirectory,
    cache: DeviceStateCache,
    throttle: WriteThrottle,
    connection_state: watch::Sender<ConnectionState>,
    change_tx: broadcast::Sender<StateChange>,
    cancel: CancellationToken,
    /// Child token for the current connection, cancelled on disconnect
    /// and replaced on the next connect.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Time of the last automatic re-login. Also serializes them.
    last_relogin: Mutex<Option<Instant>>,
}

impl Controller {
    /// Create a Controller from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to log in and start polling.
    pub fn new(config: ControllerConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: config.tls.clone(),
            timeout: config.timeout,
        };
        let http = transport.build_client()?;
        let base_url = NeviwebClient::normalize_base_url(config.url.as_str())?;
        let session = Arc::new(
            SessionManager::new(http.clone(), base_url.clone())
                .with_token_lifetime(config.token_lifetime)
                .with_lock_wait(config.lock_wait),
        );
        let client = NeviwebClient::with_session(http, base_url, session);

        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(ControllerInner {
                cache: DeviceStateCache::new(config.ttl, config.lock_wait),
                throttle: WriteThrottle::new(config.throttle, config.lock_wait),
                directory: DeviceDirectory::new(),
                client,
                config,
                connection_state,
                change_tx,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
                last_relogin: Mutex::new(None),
            }),
        })
    }

    /// Access the controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Access the underlying API client.
    pub fn client(&self) -> &NeviwebClient {
        &self.inner.client
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Log in, discover devices, and spawn one poll task per device
    /// family with a non-zero interval.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.set_state(ConnectionState::Connecting);

        // Fresh child token for this connection (supports reconnect). Poll
        // tasks of an earlier connect stop before new ones start.
        let child = self.inner.cancel.child_token();
        let previous = {
            let mut current = self.inner.cancel_child.lock().await;
            std::mem::replace(&mut *current, child.clone())
        };
        previous.cancel();
        self.join_tasks().await;

        let count = match self.login_and_discover().await {
            Ok(count) => count,
            Err(e) => {
                self.set_state(ConnectionState::Failed);
                return Err(e);
            }
        };

        let mut handles = self.inner.task_handles.lock().await;
        for family in DeviceFamily::iter() {
            let period = self.inner.config.poll.interval(family);
            if period.is_zero() {
                continue;
            }
            let ctrl = self.clone();
            let cancel = child.clone();
            handles.push(tokio::spawn(poll_task(ctrl, family, period, cancel)));
        }

        self.set_state(ConnectionState::Connected);
        info!(devices = count, "connected to Neviweb");
        Ok(())
    }

    /// Cancel background tasks, log out, and reset the connection state
    /// to [`Disconnected`](ConnectionState::Disconnected).
    pub async fn disconnect(&self) {
        // Cancel the child token (not the parent -- allows reconnect).
        self.inner.cancel_child.lock().await.cancel();
        self.join_tasks().await;

        self.set_state(ConnectionState::Disconnected);
        if let Err(e) = self.inner.client.logout().await {
            warn!(error = %e, "logout failed (non-fatal)");
        }
        debug!("disconnected");
    }

    /// One-shot: connect, run closure, disconnect.
    ///
    /// Polling is disabled since only a single request-response cycle
    /// is needed.
    pub async fn oneshot<F, Fut, T>(config: ControllerConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.poll = crate::config::PollIntervals::DISABLED;

        let controller = Controller::new(cfg)?;
        controller.connect().await?;
        let result = f(controller.clone()).await;
        controller.disconnect().await;
        result
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Subscribe to device state changes, as seen by reads and polls.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.inner.change_tx.subscribe()
    }

    // ── Directory ────────────────────────────────────────────────

    pub fn devices(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.directory.snapshot()
    }

    pub fn device(&self, id: i64) -> Option<Arc<Device>> {
        self.inner.directory.get(id)
    }

    /// List the account's locations.
    pub async fn locations(&self) -> Result<Vec<Location>, CoreError> {
        self.with_relogin(|| async move {
            match self.inner.client.list_locations().await {
                Ok(locations) => Ok(locations.into_iter().map(Location::from).collect()),
                Err(e) => Err(CoreError::from(e)),
            }
        })
        .await
    }

    /// Re-list devices and replace the directory. Returns how many
    /// supported devices were found.
    pub async fn refresh_devices(&self) -> Result<usize, CoreError> {
        let location = self.inner.config.location_id;
        let listing = self
            .with_relogin(|| async move {
                self.inner
                    .client
                    .list_devices(location)
                    .await
                    .map_err(CoreError::from)
            })
            .await?;
        let count = self.inner.directory.apply_listing(listing);
        debug!(count, ?location, "device directory refreshed");
        Ok(count)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Current state of a device, served from the cache while fresh.
    pub async fn state(&self, device_id: i64) -> Result<DeviceState, CoreError> {
        let device = self
            .device(device_id)
            .ok_or(CoreError::DeviceNotFound { device_id })?;
        let device = &*device;
        self.with_relogin(|| {
            self.inner
                .cache
                .get_state(device.id, device.family, move || self.fetch_state(device))
        })
        .await
    }

    /// Skip the cache and fetch the state now.
    pub async fn fresh_state(&self, device_id: i64) -> Result<DeviceState, CoreError> {
        self.inner.cache.invalidate(device_id).await?;
        self.state(device_id).await
    }

    /// Last known state, without any I/O.
    pub fn cached_state(&self, device_id: i64) -> Option<DeviceState> {
        self.inner.cache.peek(device_id)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Apply a partial update at normal priority.
    ///
    /// The cache is left alone; the next read after the TTL picks the
    /// change up.
    pub async fn update(&self, device_id: i64, update: StateUpdate) -> Result<(), CoreError> {
        self.update_with_priority(device_id, update, Priority::Normal)
            .await
    }

    pub async fn update_with_priority(
        &self,
        device_id: i64,
        update: StateUpdate,
        priority: Priority,
    ) -> Result<(), CoreError> {
        let device = self.inner.directory.require(device_id, update.family())?;
        update.validate()?;

        let body = AttributeUpdate::from(&update);
        let submits = if update.sets_intensity() {
            INTENSITY_SUBMITS
        } else {
            1
        };
        for attempt in 1..=submits {
            trace!(device_id, attempt, "submitting attribute write");
            self.write(device.id, &body, priority).await?;
        }
        Ok(())
    }

    pub async fn set_setpoint(&self, device_id: i64, celsius: f64) -> Result<(), CoreError> {
        let update = ThermostatUpdate {
            room_setpoint: Some(celsius),
            setpoint_mode: None,
        };
        self.update(device_id, StateUpdate::Thermostat(update)).await
    }

    pub async fn set_setpoint_mode(
        &self,
        device_id: i64,
        mode: SetpointMode,
    ) -> Result<(), CoreError> {
        let update = ThermostatUpdate {
            room_setpoint: None,
            setpoint_mode: Some(mode),
        };
        self.update(device_id, StateUpdate::Thermostat(update)).await
    }

    pub async fn set_switch(&self, device_id: i64, on: bool) -> Result<(), CoreError> {
        let update = SwitchUpdate { on: Some(on) };
        self.update(device_id, StateUpdate::Switch(update)).await
    }

    pub async fn set_dimmer(&self, device_id: i64, on: bool) -> Result<(), CoreError> {
        let update = DimmerUpdate {
            on: Some(on),
            intensity: None,
        };
        self.update(device_id, StateUpdate::Dimmer(update)).await
    }

    pub async fn set_intensity(&self, device_id: i64, intensity: u8) -> Result<(), CoreError> {
        let update = DimmerUpdate {
            on: None,
            intensity: Some(intensity),
        };
        self.update(device_id, StateUpdate::Dimmer(update)).await
    }

    // ── Internals ────────────────────────────────────────────────

    async fn login_and_discover(&self) -> Result<usize, CoreError> {
        self.inner
            .client
            .login(&self.inner.config.credentials)
            .await?;
        self.refresh_devices().await
    }

    /// Wait for every spawned poll task. Their token must already be
    /// cancelled.
    async fn join_tasks(&self) {
        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.connection_state.send_replace(state);
    }

    async fn write(
        &self,
        device_id: i64,
        body: &AttributeUpdate,
        priority: Priority,
    ) -> Result<(), CoreError> {
        self.with_relogin(|| {
            self.inner.throttle.enqueue(priority, move || async move {
                self.inner
                    .client
                    .update_attributes(device_id, body)
                    .await
                    .map(|_| ())
            })
        })
        .await
    }

    /// Read one device and publish a change if it differs from the last
    /// known state.
    async fn fetch_state(&self, device: &Device) -> Result<DeviceState, neviweb_api::Error> {
        let client = &self.inner.client;
        let current = match device.family {
            DeviceFamily::Thermostat => {
                DeviceState::Thermostat(client.get_thermostat_attributes(device.id).await?.into())
            }
            DeviceFamily::Switch => {
                DeviceState::Switch(client.get_switch_attributes(device.id).await?.into())
            }
            DeviceFamily::Dimmer => {
                DeviceState::Dimmer(client.get_dimmer_attributes(device.id).await?.into())
            }
        };

        let previous = self.inner.cache.peek(device.id);
        if previous.as_ref() != Some(&current) {
            // No subscribers is fine.
            let _ = self.inner.change_tx.send(StateChange {
                device_id: device.id,
                previous,
                current: current.clone(),
            });
        }
        Ok(current)
    }

    /// Run `op`; if it fails because the session is gone, log in again
    /// (at most once, and not more often than `reconnect_backoff`) and
    /// run it one more time.
    async fn with_relogin<T, F, Fut>(&self, op: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let observed = self.inner.client.session().generation();
        match op().await {
            Err(e) if e.is_session_error() => {
                if self.relogin(observed).await {
                    op().await
                } else {
                    Err(e)
                }
            }
            other => other,
        }
    }

    /// Returns `true` when a usable session exists afterwards.
    async fn relogin(&self, observed_generation: u64) -> bool {
        let config = &self.inner.config;
        if !config.auto_reconnect
            || *self.inner.connection_state.borrow() == ConnectionState::Disconnected
        {
            return false;
        }

        let mut last = self.inner.last_relogin.lock().await;
        let session = self.inner.client.session();
        if session.generation() != observed_generation && session.is_connected() {
            // Someone else already logged in again while we waited.
            return true;
        }
        if let Some(at) = *last {
            if at.elapsed() < config.reconnect_backoff {
                debug!(
                    backoff_secs = config.reconnect_backoff.as_secs(),
                    "re-login suppressed by backoff"
                );
                return false;
            }
        }
        *last = Some(Instant::now());

        self.set_state(ConnectionState::Reconnecting);
        match self.inner.client.login(&config.credentials).await {
            Ok(_) => {
                info!("session re-established");
                self.set_state(ConnectionState::Connected);
                true
            }
            Err(e) => {
                warn!(error = %e, "re-login failed");
                self.set_state(ConnectionState::Failed);
                false
            }
        }
    }

    async fn poll_family(&self, family: DeviceFamily) {
        let ids = self.inner.directory.ids_of(family);
        if ids.is_empty() {
            return;
        }
        let results = join_all(ids.iter().map(|&id| self.state(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                debug!(device_id = id, %family, error = %e, "poll read failed");
            }
        }
    }
}

/// Periodically read every device of one family.
async fn poll_task(
    controller: Controller,
    family: DeviceFamily,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => controller.poll_family(family).await,
        }
    }
    debug!(%family, "poll task stopped");
}
