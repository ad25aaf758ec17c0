// ── Device domain types ──

use neviweb_api::{ApiDevice, ApiLocation};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::CoreError;

/// Kind of device, derived from the SKU prefix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceFamily {
    Thermostat,
    /// Relays and load controllers.
    Switch,
    Dimmer,
}

impl DeviceFamily {
    /// Classify a SKU by its two-letter prefix.
    ///
    /// `TH` thermostat, `SW`/`RM` switch, `DM` dimmer. Gateways (`GT`) and
    /// anything else are unsupported.
    pub fn from_sku(sku: &str) -> Option<Self> {
        let prefix = sku.get(..2)?.to_ascii_uppercase();
        match prefix.as_str() {
            "TH" => Some(Self::Thermostat),
            "SW" | "RM" => Some(Self::Switch),
            "DM" => Some(Self::Dimmer),
            _ => None,
        }
    }
}

/// A Neviweb location (usually one home).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
}

impl From<ApiLocation> for Location {
    fn from(l: ApiLocation) -> Self {
        Self {
            id: l.id,
            name: l.name,
        }
    }
}

/// A supported device, immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub identifier: String,
    pub name: String,
    pub sku: String,
    pub vendor: String,
    pub parent_id: Option<i64>,
    pub location_id: Option<i64>,
    pub family: DeviceFamily,
}

impl TryFrom<ApiDevice> for Device {
    type Error = CoreError;

    fn try_from(d: ApiDevice) -> Result<Self, Self::Error> {
        let Some(family) = DeviceFamily::from_sku(&d.sku) else {
            return Err(CoreError::UnsupportedDevice {
                device_id: d.id,
                sku: d.sku,
            });
        };
        Ok(Self {
            id: d.id,
            identifier: d.identifier,
            name: d.name,
            sku: d.sku,
            vendor: d.vendor,
            parent_id: d.parent_device_id,
            location_id: d.location_id,
            family,
        })
    }
}
