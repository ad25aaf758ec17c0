// ── Device state cache ──
//
// One entry per device id, created lazily and never removed. Each entry
// has its own async guard, so a slow refresh of one device never blocks
// reads of another. Callers that queue behind an in-flight refresh take
// its outcome (state or error) instead of fetching again.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use neviweb_api::duration_millis;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, trace, warn};

use crate::config::TtlPolicy;
use crate::error::CoreError;
use crate::model::{DeviceFamily, DeviceState};

struct CacheEntry {
    /// Bumped after every refresh attempt, successful or not.
    generation: AtomicU64,
    /// Last successfully fetched state. Readable without the guard.
    known: RwLock<Option<DeviceState>>,
    guard: Mutex<Validity>,
}

#[derive(Default)]
struct Validity {
    valid_until: Option<Instant>,
    last_error: Option<Arc<neviweb_api::Error>>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            known: RwLock::new(None),
            guard: Mutex::new(Validity::default()),
        }
    }

    fn known(&self) -> Option<DeviceState> {
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, state: DeviceState) {
        *self.known.write().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }
}

/// Per-device read cache with a short validity window.
pub struct DeviceStateCache {
    entries: DashMap<i64, Arc<CacheEntry>>,
    ttl: TtlPolicy,
    lock_wait: Duration,
}

impl DeviceStateCache {
    pub fn new(ttl: TtlPolicy, lock_wait: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            lock_wait,
        }
    }

    /// Current state of `device_id`, fetched with `refresh` only when the
    /// cached copy is missing or past its TTL.
    ///
    /// At most one `refresh` runs per device at a time. Callers that waited
    /// on it return its result, including the same error. A failed refresh
    /// leaves the previous state and validity untouched.
    pub async fn get_state<F, Fut>(
        &self,
        device_id: i64,
        family: DeviceFamily,
        refresh: F,
    ) -> Result<DeviceState, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DeviceState, neviweb_api::Error>>,
    {
        let entry = self.entry(device_id);
        let observed = entry.generation.load(Ordering::Acquire);

        let mut validity = timeout(self.lock_wait, entry.guard.lock())
            .await
            .map_err(|_| self.lock_timeout(device_id))?;

        if entry.generation.load(Ordering::Acquire) != observed {
            if let Some(err) = &validity.last_error {
                return Err(CoreError::RefreshFailed {
                    device_id,
                    source: Arc::clone(err),
                });
            }
            if let Some(state) = entry.known() {
                trace!(device_id, "sharing concurrent refresh result");
                return Ok(state);
            }
        }

        if let (Some(until), Some(state)) = (validity.valid_until, entry.known()) {
            if Instant::now() < until {
                trace!(device_id, "state cache hit");
                return Ok(state);
            }
        }

        debug!(device_id, %family, "refreshing device state");
        let outcome = refresh().await;
        entry.generation.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(state) => {
                entry.store(state.clone());
                validity.valid_until = Some(Instant::now() + self.ttl.ttl(family));
                validity.last_error = None;
                Ok(state)
            }
            Err(e) => {
                warn!(device_id, error = %e, "state refresh failed, keeping last known state");
                let source = Arc::new(e);
                validity.last_error = Some(Arc::clone(&source));
                Err(CoreError::RefreshFailed { device_id, source })
            }
        }
    }

    /// Last known state without any I/O or waiting.
    pub fn peek(&self, device_id: i64) -> Option<DeviceState> {
        self.entries.get(&device_id).and_then(|e| e.known())
    }

    /// Expire the cached state so the next read refreshes. The last known
    /// state stays available to [`peek`](Self::peek).
    pub async fn invalidate(&self, device_id: i64) -> Result<(), CoreError> {
        let Some(entry) = self.entries.get(&device_id).map(|e| Arc::clone(e.value())) else {
            return Ok(());
        };
        let mut validity = timeout(self.lock_wait, entry.guard.lock())
            .await
            .map_err(|_| self.lock_timeout(device_id))?;
        validity.valid_until = None;
        Ok(())
    }

    fn lock_timeout(&self, device_id: i64) -> CoreError {
        CoreError::LockTimeout {
            resource: format!("device {device_id} state"),
            waited_ms: duration_millis(self.lock_wait),
        }
    }

    fn entry(&self, device_id: i64) -> Arc<CacheEntry> {
        Arc::clone(
            self.entries
                .entry(device_id)
                .or_insert_with(|| Arc::new(CacheEntry::new()))
                .value(),
        )
    }
}
