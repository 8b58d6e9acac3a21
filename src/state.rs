//! Per-tick data shared between the control-loop stages.
//!
//! All types are `Copy`; the control loop owns them and hands out references.

// ── Flags ─────────────────────────────────────────────────────────────────────

/// Flags written by the traction controller and read by actuation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct State {
    pub wheelslip: bool,
    /// Board is tilted against the direction of travel.
    pub braking_pos: bool,
}

// ── Sensor bundles ────────────────────────────────────────────────────────────

/// Raw and derived sensor values for the current tick.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RuntimeData {
    pub current_time: f32,
    pub last_time: f32,
    pub diff_time: f32,

    pub gyro: [f32; 3],
    pub accel: [f32; 3],

    /// Raw pitch from the host IMU (deg)
    pub pitch_angle: f32,
    /// Pitch after the configured attitude filter (deg)
    pub pitch_filtered: f32,
    pub roll_angle: f32,

    pub setpoint: f32,
    /// Setpoint minus filtered pitch
    pub proportional: f32,
}

/// One reading of the motor controller state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorSample {
    pub erpm: f32,
    /// Directional motor current (A)
    pub current: f32,
    pub duty_cycle: f32,
}

/// Which estimator smooths the pitch fed to the balance terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttitudeFilter {
    None,
    #[default]
    Biquad,
    Kalman,
    /// Kalman fusion followed by the biquad low-pass
    Both,
}
