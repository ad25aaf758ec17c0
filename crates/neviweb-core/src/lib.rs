//! Device layer between `neviweb-api` and the CLI.
//!
//! - **[`Controller`]**: Central facade. [`connect()`](Controller::connect)
//!   logs in, discovers devices, then spawns one poll task per device
//!   family. [`Controller::oneshot()`] runs a single operation between a
//!   login and a logout.
//!
//! - **[`DeviceStateCache`]**: Per-device read cache. Concurrent reads of
//!   one device share a single fetch; reads of different devices never
//!   wait on each other.
//!
//! - **[`WriteThrottle`]**: Ticket queue that serializes attribute writes,
//!   spaces them out, and serves them by priority then arrival order.
//!
//! - **[`DeviceDirectory`]**: Supported devices, classified from their
//!   SKU, with a `watch` snapshot for subscribers.

pub mod cache;
pub mod config;
pub mod controller;
pub mod directory;
pub mod error;
pub mod model;
pub mod throttle;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::DeviceStateCache;
pub use config::{ControllerConfig, PollIntervals, ThrottleConfig, TtlPolicy};
pub use controller::{ConnectionState, Controller, StateChange};
pub use directory::DeviceDirectory;
pub use error::CoreError;
pub use throttle::{Priority, Ticket, WriteThrottle};

pub use model::{
    Device, DeviceFamily, DeviceState, DimmerState, DimmerUpdate, Location, SetpointMode,
    StateUpdate, SwitchState, SwitchUpdate, ThermostatState, ThermostatUpdate,
};

// Types callers need to build a `ControllerConfig`.
pub use neviweb_api::{Credentials, DEFAULT_BASE_URL, TlsMode};
