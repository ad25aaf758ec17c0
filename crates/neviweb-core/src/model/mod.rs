// ── Domain model ──
//
// Canonical device and state types, decoupled from the wire shapes in
// `neviweb_api::models`.

pub mod device;
pub mod state;

pub use device::{Device, DeviceFamily, Location};
pub use state::{
    DeviceState, DimmerState, DimmerUpdate, SetpointMode, StateUpdate, SwitchState, SwitchUpdate,
    ThermostatState, ThermostatUpdate,
};
