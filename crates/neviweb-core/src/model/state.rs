// ── Device state and updates ──
//
// Typed snapshots built from attribute reads, and typed partial updates
// that serialize to the provider's attribute write body.

use std::fmt;

use neviweb_api::AttributeUpdate;
use neviweb_api::models::{DimmerAttributes, SwitchAttributes, ThermostatAttributes};
use serde::{Deserialize, Serialize};

use super::device::DeviceFamily;
use crate::error::CoreError;

/// Lowest and highest setpoints a Sinopé thermostat accepts, in °C.
pub const SETPOINT_RANGE: (f64, f64) = (5.0, 30.0);

const ON: &str = "on";
const OFF: &str = "off";

// ── Setpoint mode ────────────────────────────────────────────────────

/// Thermostat operating mode as reported by `setpointMode`.
///
/// Unknown provider values are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SetpointMode {
    Off,
    Manual,
    Auto,
    AutoBypass,
    Away,
    FrostProtection,
    Other(String),
}

impl SetpointMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Off => "off",
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::AutoBypass => "autoBypass",
            Self::Away => "away",
            Self::FrostProtection => "frostProtection",
            Self::Other(raw) => raw,
        }
    }
}

impl From<&str> for SetpointMode {
    fn from(raw: &str) -> Self {
        match raw {
            "off" => Self::Off,
            "manual" => Self::Manual,
            "auto" => Self::Auto,
            "autoBypass" => Self::AutoBypass,
            "away" => Self::Away,
            "frostProtection" => Self::FrostProtection,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for SetpointMode {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<SetpointMode> for String {
    fn from(mode: SetpointMode) -> Self {
        mode.as_str().to_owned()
    }
}

impl fmt::Display for SetpointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── States ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermostatState {
    /// Measured room temperature, °C.
    pub room_temperature: Option<f64>,
    /// Target temperature, °C.
    pub room_setpoint: Option<f64>,
    /// Heating output, 0-100 %.
    pub output_percent: Option<f64>,
    pub setpoint_mode: Option<SetpointMode>,
    /// Raw alarm bitfield (`alarmsActive0`).
    pub alarms_active: Option<i64>,
}

impl ThermostatState {
    /// Whether the thermostat is currently driving its heater.
    pub fn is_heating(&self) -> bool {
        self.output_percent.is_some_and(|p| p > 0.0)
    }
}

impl From<ThermostatAttributes> for ThermostatState {
    fn from(a: ThermostatAttributes) -> Self {
        Self {
            room_temperature: a.room_temperature.and_then(|m| m.value),
            room_setpoint: a.room_setpoint,
            output_percent: a.output_percent_display,
            setpoint_mode: a.setpoint_mode.map(SetpointMode::from),
            alarms_active: a.alarms_active0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    pub on: bool,
}

impl From<SwitchAttributes> for SwitchState {
    fn from(a: SwitchAttributes) -> Self {
        Self {
            on: is_on(a.on_off.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimmerState {
    pub on: bool,
    /// Brightness, 0-100 %.
    pub intensity: u8,
}

impl From<DimmerAttributes> for DimmerState {
    fn from(a: DimmerAttributes) -> Self {
        let intensity = a
            .intensity
            .map_or(0, |v| u8::try_from(v.clamp(0, 100)).unwrap_or(0));
        Self {
            on: is_on(a.on_off.as_deref()),
            intensity,
        }
    }
}

fn is_on(on_off: Option<&str>) -> bool {
    on_off.is_some_and(|v| v.eq_ignore_ascii_case(ON))
}

fn on_off(on: bool) -> String {
    let value = if on { ON } else { OFF };
    value.to_owned()
}

/// Last known state of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum DeviceState {
    Thermostat(ThermostatState),
    Switch(SwitchState),
    Dimmer(DimmerState),
}

impl DeviceState {
    pub fn family(&self) -> DeviceFamily {
        match self {
            Self::Thermostat(_) => DeviceFamily::Thermostat,
            Self::Switch(_) => DeviceFamily::Switch,
            Self::Dimmer(_) => DeviceFamily::Dimmer,
        }
    }
}

// ── Updates ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermostatUpdate {
    pub room_setpoint: Option<f64>,
    pub setpoint_mode: Option<SetpointMode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchUpdate {
    pub on: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimmerUpdate {
    pub on: Option<bool>,
    pub intensity: Option<u8>,
}

/// A partial write for one device. Only the fields that are `Some` are
/// sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum StateUpdate {
    Thermostat(ThermostatUpdate),
    Switch(SwitchUpdate),
    Dimmer(DimmerUpdate),
}

impl StateUpdate {
    pub fn family(&self) -> DeviceFamily {
        match self {
            Self::Thermostat(_) => DeviceFamily::Thermostat,
            Self::Switch(_) => DeviceFamily::Switch,
            Self::Dimmer(_) => DeviceFamily::Dimmer,
        }
    }

    /// Whether this update changes dimmer brightness. Those writes are
    /// submitted twice.
    pub fn sets_intensity(&self) -> bool {
        matches!(
            self,
            Self::Dimmer(DimmerUpdate {
                intensity: Some(_),
                ..
            })
        )
    }

    /// Reject empty and out-of-range updates before they reach the queue.
    pub fn validate(&self) -> Result<(), CoreError> {
        if AttributeUpdate::from(self).is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "update changes nothing".into(),
            });
        }
        match self {
            Self::Thermostat(ThermostatUpdate {
                room_setpoint: Some(sp),
                ..
            }) => {
                let (min, max) = SETPOINT_RANGE;
                if !sp.is_finite() || *sp < min || *sp > max {
                    return Err(CoreError::ValidationFailed {
                        message: format!("setpoint {sp} outside {min}-{max} °C"),
                    });
                }
            }
            Self::Dimmer(DimmerUpdate {
                intensity: Some(level),
                ..
            }) if *level > 100 => {
                return Err(CoreError::ValidationFailed {
                    message: format!("intensity {level} outside 0-100"),
                });
            }
            _ => {}
        }
        Ok(())
    }
}

impl From<&StateUpdate> for AttributeUpdate {
    fn from(update: &StateUpdate) -> Self {
        match update {
            StateUpdate::Thermostat(t) => AttributeUpdate {
                room_setpoint: t.room_setpoint,
                setpoint_mode: t.setpoint_mode.as_ref().map(|m| m.as_str().to_owned()),
                ..AttributeUpdate::default()
            },
            StateUpdate::Switch(s) => AttributeUpdate {
                on_off: s.on.map(on_off),
                ..AttributeUpdate::default()
            },
            StateUpdate::Dimmer(d) => AttributeUpdate {
                on_off: d.on.map(on_off),
                intensity: d.intensity,
                ..AttributeUpdate::default()
            },
        }
    }
}
