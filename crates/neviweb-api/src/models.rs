// Wire types for the Neviweb API
//
// Field names follow the provider's JSON schema (camelCase, with `$id`
// suffixes on foreign keys). Everything optional that the provider is
// known to omit is `Option` so a sparse response still parses.

use serde::{Deserialize, Serialize};

// ── Authentication ───────────────────────────────────────────────────

/// Body of `POST login`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub interface: &'a str,
    pub stay_connected: u8,
}

/// Response of `POST login` and `POST connect`.
///
/// The provider answers HTTP 200 in both cases; a refusal carries `error`
/// instead of the session fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    pub session: Option<String>,
    pub iat: Option<i64>,
    pub refresh_token: Option<String>,
    pub error: Option<ErrorBody>,
}

/// Response of `GET logout`.
#[derive(Debug, Deserialize)]
pub(crate) struct LogoutResponse {
    #[serde(default)]
    pub success: bool,
}

/// Provider error object: `{"code": "USRSESSEXP", ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Any JSON object that may carry an `error` member.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: Option<ErrorBody>,
}

// ── Directory ────────────────────────────────────────────────────────

/// A Neviweb location (a home, usually one per account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLocation {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// A device as listed by `GET devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDevice {
    pub id: i64,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(rename = "parentDevice$id", default)]
    pub parent_device_id: Option<i64>,
    #[serde(rename = "location$id", default)]
    pub location_id: Option<i64>,
}

// ── Attributes ───────────────────────────────────────────────────────

/// Temperature reading wrapper: `{"value": 21.5, ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Measurement {
    pub value: Option<f64>,
}

/// Thermostat attribute set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatAttributes {
    pub room_temperature: Option<Measurement>,
    pub room_setpoint: Option<f64>,
    pub output_percent_display: Option<f64>,
    pub setpoint_mode: Option<String>,
    pub alarms_active0: Option<i64>,
}

/// Switch (relay / load controller) attribute set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchAttributes {
    pub on_off: Option<String>,
}

/// Dimmer attribute set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimmerAttributes {
    pub on_off: Option<String>,
    pub intensity: Option<i64>,
}

/// Partial attribute write, body of `PUT device/{id}/attribute`.
///
/// Only the fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_setpoint: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setpoint_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_off: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
}

impl AttributeUpdate {
    pub fn is_empty(&self) -> bool {
        self.room_setpoint.is_none()
            && self.setpoint_mode.is_none()
            && self.on_off.is_none()
            && self.intensity.is_none()
    }
}
