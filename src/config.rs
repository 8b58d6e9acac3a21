//! Tuning parameters read from the motor controller configuration.

use thiserror::Error;

use crate::drivers::kalman::{KalmanConfig, DEFAULT_GYRO_SCALE};
use crate::state::AttitudeFilter;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Control loop rate
const DEFAULT_HERTZ: u16 = 1000;
/// Pitch low-pass cutoff (Hz)
const DEFAULT_PITCH_FILTER: f32 = 10.0;

/// Kalman tuning, scaled by 1e-4 / 1e-4 / 1e-5
const DEFAULT_KALMAN_FACTOR1: f32 = 10.0;
const DEFAULT_KALMAN_FACTOR2: f32 = 30.0;
const DEFAULT_KALMAN_FACTOR3: f32 = 3000.0;

/// Wheelslip thresholds in ERPM/ms
const DEFAULT_WHEELSLIP_ACCELSTART: f32 = 50.0;
const DEFAULT_WHEELSLIP_ACCELEND: f32 = 10.0;
/// Speed at which the wheelslip threshold stops being scaled up
const DEFAULT_WHEELSLIP_SCALEERPM: f32 = 10_000.0;
/// Threshold multiplier at standstill
const DEFAULT_WHEELSLIP_SCALEACCEL: f32 = 1.5;

const DEFAULT_CURRENT_MAX: f32 = 60.0;
const DEFAULT_CURRENT_MIN: f32 = 60.0;
const DEFAULT_DUTY_MAX: f32 = 0.95;

// ── Vehicle control ───────────────────────────────────────────────────────────

/// Speed limiting and chassis-slip response of the kart control variant.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VehicleTuning {
    pub max_erpm_base: f32,
    /// ERPM of headroom per A of averaged current
    pub speed_factor: f32,
    /// ERPM of headroom per ERPM/tick of acceleration
    pub accel_factor: f32,
    /// Yaw-axis gyro magnitude treated as chassis slip
    pub max_gyro_y: f32,
    /// Planar acceleration magnitude treated as chassis slip (g)
    pub max_accel: f32,
    /// Brake current while the chassis slips (A)
    pub brake_current: f32,
    pub duty_reduction: f32,
    /// Multiplier on the ERPM limit while wheelslip is active
    pub wheelslip_erpm_scale: f32,
}

impl Default for VehicleTuning {
    fn default() -> Self {
        Self {
            max_erpm_base: 10_000.0,
            speed_factor: 0.1,
            accel_factor: 50.0,
            max_gyro_y: 100.0,
            max_accel: 3.0,
            brake_current: 0.8,
            duty_reduction: 0.9,
            wheelslip_erpm_scale: 0.8,
        }
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub hertz: u16,
    pub pitch_filter: f32,
    pub attitude_filter: AttitudeFilter,

    pub kalman_factor1: f32,
    pub kalman_factor2: f32,
    pub kalman_factor3: f32,
    pub kalman_gyro_scale: f32,

    pub wheelslip_accelstart: f32,
    pub wheelslip_accelend: f32,
    pub wheelslip_scaleerpm: f32,
    pub wheelslip_scaleaccel: f32,

    pub current_max: f32,
    /// Magnitude of the regen current limit
    pub current_min: f32,
    pub duty_max: f32,

    pub vehicle: VehicleTuning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hertz: DEFAULT_HERTZ,
            pitch_filter: DEFAULT_PITCH_FILTER,
            attitude_filter: AttitudeFilter::default(),
            kalman_factor1: DEFAULT_KALMAN_FACTOR1,
            kalman_factor2: DEFAULT_KALMAN_FACTOR2,
            kalman_factor3: DEFAULT_KALMAN_FACTOR3,
            kalman_gyro_scale: DEFAULT_GYRO_SCALE,
            wheelslip_accelstart: DEFAULT_WHEELSLIP_ACCELSTART,
            wheelslip_accelend: DEFAULT_WHEELSLIP_ACCELEND,
            wheelslip_scaleerpm: DEFAULT_WHEELSLIP_SCALEERPM,
            wheelslip_scaleaccel: DEFAULT_WHEELSLIP_SCALEACCEL,
            current_max: DEFAULT_CURRENT_MAX,
            current_min: DEFAULT_CURRENT_MIN,
            duty_max: DEFAULT_DUTY_MAX,
            vehicle: VehicleTuning::default(),
        }
    }
}

impl Config {
    /// Reads every known parameter from `source`, keeping the default for
    /// anything the source does not provide, then validates the result.
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(hz) = source.get(ConfigParam::Hertz) {
            if !(1.0..=u16::MAX as f32).contains(&hz) {
                return Err(ConfigError::InvalidTickRate);
            }
            config.hertz = hz as u16;
        }
        if let Some(mode) = source.get(ConfigParam::AttitudeFilter) {
            config.attitude_filter = match mode as u8 {
                0 => AttitudeFilter::None,
                1 => AttitudeFilter::Biquad,
                2 => AttitudeFilter::Kalman,
                _ => AttitudeFilter::Both,
            };
        }

        let fields: [(ConfigParam, &mut f32); 19] = [
            (ConfigParam::PitchFilter, &mut config.pitch_filter),
            (ConfigParam::KalmanFactor1, &mut config.kalman_factor1),
            (ConfigParam::KalmanFactor2, &mut config.kalman_factor2),
            (ConfigParam::KalmanFactor3, &mut config.kalman_factor3),
            (ConfigParam::KalmanGyroScale, &mut config.kalman_gyro_scale),
            (ConfigParam::WheelslipAccelStart, &mut config.wheelslip_accelstart),
            (ConfigParam::WheelslipAccelEnd, &mut config.wheelslip_accelend),
            (ConfigParam::WheelslipScaleErpm, &mut config.wheelslip_scaleerpm),
            (ConfigParam::WheelslipScaleAccel, &mut config.wheelslip_scaleaccel),
            (ConfigParam::CurrentMax, &mut config.current_max),
            (ConfigParam::CurrentMin, &mut config.current_min),
            (ConfigParam::DutyMax, &mut config.duty_max),
            (ConfigParam::MaxErpmBase, &mut config.vehicle.max_erpm_base),
            (ConfigParam::SpeedFactor, &mut config.vehicle.speed_factor),
            (ConfigParam::AccelFactor, &mut config.vehicle.accel_factor),
            (ConfigParam::MaxGyroY, &mut config.vehicle.max_gyro_y),
            (ConfigParam::MaxAccel, &mut config.vehicle.max_accel),
            (ConfigParam::BrakeCurrent, &mut config.vehicle.brake_current),
            (ConfigParam::DutyReduction, &mut config.vehicle.duty_reduction),
        ];
        for (param, slot) in fields {
            if let Some(value) = source.get(param) {
                *slot = value;
            }
        }
        // regen limit is configured as a negative current on the controller
        config.current_min = config.current_min.abs();

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hertz == 0 {
            return Err(ConfigError::InvalidTickRate);
        }
        let nyquist_hz = self.hertz as f32 / 2.0;
        if !(self.pitch_filter > 0.0 && self.pitch_filter < nyquist_hz) {
            return Err(ConfigError::InvalidFilterFrequency {
                cutoff_hz: self.pitch_filter,
                nyquist_hz,
            });
        }
        if !(self.current_max > 0.0 && self.current_min >= 0.0) {
            return Err(ConfigError::InvalidCurrentLimits);
        }
        if !(self.duty_max > 0.0 && self.duty_max <= 1.0) {
            return Err(ConfigError::InvalidDutyLimit(self.duty_max));
        }
        for (index, factor) in [self.kalman_factor1, self.kalman_factor2, self.kalman_factor3]
            .into_iter()
            .enumerate()
        {
            if !(factor >= 0.0) {
                return Err(ConfigError::InvalidKalmanFactor { index: index as u8 + 1 });
            }
        }
        if self.kalman_factor3 == 0.0 {
            return Err(ConfigError::InvalidKalmanFactor { index: 3 });
        }
        if !(self.kalman_gyro_scale > 0.0) {
            return Err(ConfigError::InvalidGyroScale);
        }
        Ok(())
    }

    /// Tick period in seconds.
    pub fn sample_period(&self) -> f32 {
        1.0 / self.hertz as f32
    }

    /// Wheelslip onset threshold converted from ERPM/ms to ERPM/tick.
    pub fn start_accel(&self) -> f32 {
        erpm_per_ms_to_per_tick(self.wheelslip_accelstart, self.hertz)
    }

    /// Recovered-traction threshold in ERPM/tick.
    pub fn slowed_accel(&self) -> f32 {
        erpm_per_ms_to_per_tick(self.wheelslip_accelend, self.hertz)
    }

    /// Milliseconds per tick.
    pub fn freq_factor(&self) -> f32 {
        1000.0 / self.hertz as f32
    }

    /// Pitch cutoff normalized to the tick rate.
    pub fn pitch_filter_frequency(&self) -> f32 {
        self.pitch_filter / self.hertz as f32
    }

    pub fn kalman(&self) -> KalmanConfig {
        KalmanConfig::from_factors(self.kalman_factor1, self.kalman_factor2, self.kalman_factor3)
    }
}

fn erpm_per_ms_to_per_tick(value: f32, hertz: u16) -> f32 {
    1000.0 * value / hertz as f32
}

// ── Source ────────────────────────────────────────────────────────────────────

/// Parameters the control loop reads from the host configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigParam {
    Hertz,
    PitchFilter,
    AttitudeFilter,
    KalmanFactor1,
    KalmanFactor2,
    KalmanFactor3,
    KalmanGyroScale,
    WheelslipAccelStart,
    WheelslipAccelEnd,
    WheelslipScaleErpm,
    WheelslipScaleAccel,
    CurrentMax,
    CurrentMin,
    DutyMax,
    MaxErpmBase,
    SpeedFactor,
    AccelFactor,
    MaxGyroY,
    MaxAccel,
    BrakeCurrent,
    DutyReduction,
}

/// Numeric configuration store of the host firmware.
pub trait ConfigSource {
    fn get(&self, param: ConfigParam) -> Option<f32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("tick rate must be between 1 and 65535 Hz")]
    InvalidTickRate,
    #[error("filter cutoff {cutoff_hz} Hz is outside (0, {nyquist_hz}) Hz")]
    InvalidFilterFrequency { cutoff_hz: f32, nyquist_hz: f32 },
    #[error("current limits must be positive")]
    InvalidCurrentLimits,
    #[error("duty limit {0} is outside (0, 1]")]
    InvalidDutyLimit(f32),
    #[error("kalman factor {index} is negative or zero")]
    InvalidKalmanFactor { index: u8 },
    #[error("gyro scale must be positive")]
    InvalidGyroScale,
}
