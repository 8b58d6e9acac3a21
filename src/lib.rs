//! Traction control for a self-balancing vehicle running as a motor
//! controller plugin.
//!
//! The host firmware provides sensor reads, motor commands and a clock
//! through the traits in [`host`]; [`tasks::control_loop::ControlLoop`] runs
//! the filters and the wheelslip state machine once per tick.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod drivers;
pub mod host;
pub mod state;
pub mod tasks;
pub mod telemetry;

pub use config::{Config, ConfigError, ConfigParam, ConfigSource};
pub use drivers::traction::{DeactivationReason, TractionEvent};
pub use host::{ActuatorSink, Clock, Host, SensorSource};
pub use tasks::control_loop::ControlLoop;
pub use telemetry::{Telemetry, TelemetryError, TelemetrySnapshot};
