// Device endpoints
//
// Locations, device listing, per-family attribute reads, and attribute
// writes. All go through the session-checked verbs in `client.rs`.

use crate::client::NeviwebClient;
use crate::error::Error;
use crate::models::{
    ApiDevice, ApiLocation, AttributeUpdate, DimmerAttributes, SwitchAttributes,
    ThermostatAttributes,
};

/// Attributes read for a thermostat.
pub const THERMOSTAT_ATTRIBUTES: &[&str] = &[
    "roomTemperature",
    "outputPercentDisplay",
    "setpointMode",
    "alarmsActive0",
    "roomSetpoint",
];

/// Attributes read for a switch.
pub const SWITCH_ATTRIBUTES: &[&str] = &["onOff"];

/// Attributes read for a dimmer.
pub const DIMMER_ATTRIBUTES: &[&str] = &["onOff", "intensity"];

fn attribute_path(device_id: i64, attributes: &[&str]) -> String {
    format!("device/{device_id}/attribute?attributes={}", attributes.join(","))
}

impl NeviwebClient {
    /// List the account's locations.
    ///
    /// `GET locations`
    pub async fn list_locations(&self) -> Result<Vec<ApiLocation>, Error> {
        self.get("locations").await
    }

    /// List devices, optionally restricted to one location.
    ///
    /// `GET devices?location$id={id}`
    pub async fn list_devices(&self, location_id: Option<i64>) -> Result<Vec<ApiDevice>, Error> {
        match location_id {
            Some(id) => self.get(&format!("devices?location$id={id}")).await,
            None => self.get("devices").await,
        }
    }

    /// `GET device/{id}/attribute?attributes=roomTemperature,...`
    pub async fn get_thermostat_attributes(
        &self,
        device_id: i64,
    ) -> Result<ThermostatAttributes, Error> {
        self.get(&attribute_path(device_id, THERMOSTAT_ATTRIBUTES))
            .await
    }

    /// `GET device/{id}/attribute?attributes=onOff`
    pub async fn get_switch_attributes(&self, device_id: i64) -> Result<SwitchAttributes, Error> {
        self.get(&attribute_path(device_id, SWITCH_ATTRIBUTES)).await
    }

    /// `GET device/{id}/attribute?attributes=onOff,intensity`
    pub async fn get_dimmer_attributes(&self, device_id: i64) -> Result<DimmerAttributes, Error> {
        self.get(&attribute_path(device_id, DIMMER_ATTRIBUTES)).await
    }

    /// Write a partial attribute set. Returns the provider's raw answer.
    ///
    /// `PUT device/{id}/attribute`
    pub async fn update_attributes(
        &self,
        device_id: i64,
        update: &AttributeUpdate,
    ) -> Result<serde_json::Value, Error> {
        self.put(&format!("device/{device_id}/attribute"), update)
            .await
    }
}
