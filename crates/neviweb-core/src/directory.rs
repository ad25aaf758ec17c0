// ── Device directory ──
//
// Lock-free storage of discovered devices with push-based change
// notification via a `watch` snapshot. Refreshed wholesale from
// `GET devices`; unsupported SKUs never enter it.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use neviweb_api::ApiDevice;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{Device, DeviceFamily};

pub struct DeviceDirectory {
    by_id: DashMap<i64, Arc<Device>>,
    /// Full snapshot, rebuilt on mutation, sorted by id.
    snapshot: watch::Sender<Arc<Vec<Arc<Device>>>>,
}

impl Default for DeviceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDirectory {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Replace the directory contents with a fresh listing.
    ///
    /// Supported devices are upserted, then ids missing from the listing
    /// are pruned. Returns how many devices were kept.
    pub fn apply_listing(&self, listing: Vec<ApiDevice>) -> usize {
        let devices: Vec<Device> = listing
            .into_iter()
            .filter_map(|api| match Device::try_from(api) {
                Ok(device) => Some(device),
                Err(CoreError::UnsupportedDevice { device_id, sku }) => {
                    debug!(device_id, %sku, "skipping unsupported device");
                    None
                }
                Err(_) => None,
            })
            .collect();

        let incoming: HashSet<i64> = devices.iter().map(|d| d.id).collect();
        for device in devices {
            self.by_id.insert(device.id, Arc::new(device));
        }
        self.by_id.retain(|id, _| incoming.contains(id));

        self.rebuild_snapshot();
        incoming.len()
    }

    pub fn get(&self, id: i64) -> Option<Arc<Device>> {
        self.by_id.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Look up a device and check it belongs to `family`.
    pub fn require(&self, id: i64, family: DeviceFamily) -> Result<Arc<Device>, CoreError> {
        let device = self
            .get(id)
            .ok_or(CoreError::DeviceNotFound { device_id: id })?;
        if device.family != family {
            return Err(CoreError::FamilyMismatch {
                device_id: id,
                expected: family,
                actual: device.family,
            });
        }
        Ok(device)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.snapshot.borrow().clone()
    }

    /// Ids of all devices in one family.
    pub fn ids_of(&self, family: DeviceFamily) -> Vec<i64> {
        self.snapshot()
            .iter()
            .filter(|d| d.family == family)
            .map(|d| d.id)
            .collect()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Device>> =
            self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by_key(|d| d.id);
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
