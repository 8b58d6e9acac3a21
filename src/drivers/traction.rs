//! Wheelslip detection.
//!
//! Two states driven by `State::wheelslip`. Onset needs motor acceleration
//! above a speed-scaled threshold while current and acceleration agree in
//! direction. Recovery has two physical signatures, acceleration changing
//! direction and acceleration decaying, each with its own grace period
//! before the hard ceiling.

use super::math::{lerp, sign};
use super::motor_data::MotorData;
use crate::config::Config;
use crate::state::State;

/// Minimum gap between a deactivation and the next activation (s)
const REACTIVATION_DELAY: f32 = 0.02;
/// Slip still accelerating in the onset direction after this long is dropped (s)
const HIGH_ACCEL_TIMEOUT: f32 = 0.21;
/// Fallback for the magnitude check while acceleration has not reversed (s)
const MAGNITUDE_TIMEOUT: f32 = 0.22;
/// Hard ceiling on a single slip event (s)
const SLIP_TIMEOUT: f32 = 0.3;
/// Window of the activation counter (s)
const AGGREGATE_WINDOW: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeactivationReason {
    /// Acceleration kept its onset direction for 210 ms
    HardTimeout210,
    /// Acceleration neither reversed nor decayed within 220 ms. Shares the
    /// `highaccelon` condition with the 210 ms check, which runs first, so
    /// `check` never reports it; kept for the telemetry code table.
    HardTimeout220,
    /// Slip lasted 300 ms
    HardTimeout300,
    /// Acceleration fell below the recovered threshold
    MagnitudeDrop,
    /// Reverse slip ended with hard and soft ERPM signs agreeing again
    ReverseResolved,
}

impl DeactivationReason {
    /// Numeric code published in the traction debug telemetry.
    pub fn code(self) -> u16 {
        match self {
            Self::HardTimeout210 => 210,
            Self::HardTimeout220 => 220,
            Self::HardTimeout300 => 300,
            Self::MagnitudeDrop => 2,
            Self::ReverseResolved => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TractionEvent {
    Activated,
    Deactivated(DeactivationReason),
}

/// Persistent state of the wheelslip detector.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TractionData {
    /// Time wheelslip was last engaged
    pub timeron: f32,
    /// Time wheelslip was last released
    pub timeroff: f32,
    /// Acceleration when wheelslip engaged
    pub accelstartval: f32,
    /// Acceleration has not yet reversed since onset
    pub highaccelon: bool,
    /// Set on any ERPM zero crossing where acceleration opposes the soft
    /// sign, whether or not a slip starts. Cleared only by a deactivation, so
    /// it can still be set when a later slip begins.
    pub reverse_wheelslip: bool,

    /// Onset threshold (ERPM/tick)
    pub start_accel: f32,
    /// Recovered threshold (ERPM/tick)
    pub slowed_accel: f32,
    pub scale_erpm: f32,
    pub scale_accel: f32,
}

/// Diagnostics only; nothing here feeds back into control.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TractionDebug {
    /// Time from onset to acceleration reversal (s)
    pub debug1: f32,
    /// ERPM factor at onset
    pub debug2: f32,
    /// ERPM one tick before onset
    pub debug3: f32,
    /// Code of the last deactivation reason, 0 while slipping
    pub debug4: f32,
    /// Activations in the current aggregate window
    pub debug5: f32,
    /// Onset acceleration in ERPM/ms
    pub debug6: f32,
    pub debug7: f32,
    /// Duration of the last slip (s)
    pub debug8: f32,
    /// ERPM at onset
    pub debug9: f32,
    pub aggregate_timer: f32,
    /// Milliseconds per tick
    pub freq_factor: f32,
    pub last_reason: Option<DeactivationReason>,
}

impl TractionDebug {
    pub const ZERO: Self = Self {
        debug1: 0.0,
        debug2: 0.0,
        debug3: 0.0,
        debug4: 0.0,
        debug5: 0.0,
        debug6: 0.0,
        debug7: 0.0,
        debug8: 0.0,
        debug9: 0.0,
        aggregate_timer: 0.0,
        freq_factor: 0.0,
        last_reason: None,
    };
}

pub struct TractionController {
    data: TractionData,
    debug: TractionDebug,
}

impl TractionController {
    pub fn new(config: &Config) -> Self {
        let mut controller = Self {
            data: TractionData::default(),
            debug: TractionDebug::default(),
        };
        controller.configure(config);
        controller
    }

    /// Converts thresholds to per-tick units. Call again whenever the tick
    /// rate changes.
    pub fn configure(&mut self, config: &Config) {
        self.data.start_accel = config.start_accel();
        self.data.slowed_accel = config.slowed_accel();
        self.data.scale_erpm = config.wheelslip_scaleerpm;
        self.data.scale_accel = config.wheelslip_scaleaccel;
        self.debug.freq_factor = config.freq_factor();
    }

    pub fn reset(&mut self, state: &mut State) {
        state.wheelslip = false;
        self.data.reverse_wheelslip = false;
        self.data.highaccelon = false;
        self.data.accelstartval = 0.0;
        self.data.timeron = 0.0;
        self.data.timeroff = 0.0;
    }

    /// Runs once per tick after the motor data update.
    pub fn check(&mut self, m: &MotorData, state: &mut State, now: f32) -> Option<TractionEvent> {
        // Raise the threshold at low speed where ERPM noise is larger
        let erpm_factor = lerp(0.0, self.data.scale_erpm, self.data.scale_accel, 1.0, m.abs_erpm).max(1.0);

        let mut event = None;
        if state.wheelslip {
            event = self
                .check_release(m, state, now)
                .map(TractionEvent::Deactivated);
        }

        let last_erpm = m.last_erpm();
        let mut start_condition = false;
        if m.erpm_sign == sign(last_erpm) {
            if m.abs_erpm > last_erpm.abs() {
                start_condition = self.accelerating_freely(m, state, erpm_factor);
            }
        } else if sign(m.erpm_sign_soft) != sign(m.accel_now()) {
            self.data.reverse_wheelslip = true;
            start_condition = self.accelerating_freely(m, state, erpm_factor);
        }

        if start_condition && !state.wheelslip && now - self.data.timeroff > REACTIVATION_DELAY {
            self.activate(m, state, now, erpm_factor);
            event = Some(TractionEvent::Activated);
        }

        event
    }

    fn accelerating_freely(&self, m: &MotorData, state: &State, erpm_factor: f32) -> bool {
        sign(m.current) * m.acceleration > self.data.start_accel * erpm_factor
            && sign(m.current) == sign(m.accel_now())
            && !state.braking_pos
    }

    fn check_release(&mut self, m: &MotorData, state: &mut State, now: f32) -> Option<DeactivationReason> {
        let elapsed = now - self.data.timeron;

        if elapsed > SLIP_TIMEOUT {
            return Some(self.deactivate(state, now, DeactivationReason::HardTimeout300));
        }

        if self.data.highaccelon {
            if sign(self.data.accelstartval) != sign(m.accel_now()) {
                self.data.highaccelon = false;
                self.debug.debug1 = elapsed;
            } else if elapsed > HIGH_ACCEL_TIMEOUT {
                return Some(self.deactivate(state, now, DeactivationReason::HardTimeout210));
            }
        }

        if sign(self.data.accelstartval) * m.acceleration < self.data.slowed_accel {
            return Some(self.deactivate(state, now, DeactivationReason::MagnitudeDrop));
        } else if elapsed > MAGNITUDE_TIMEOUT && self.data.highaccelon {
            return Some(self.deactivate(state, now, DeactivationReason::HardTimeout220));
        }

        if self.data.reverse_wheelslip && m.erpm_sign == m.erpm_sign_soft {
            return Some(self.deactivate(state, now, DeactivationReason::ReverseResolved));
        }

        None
    }

    fn activate(&mut self, m: &MotorData, state: &mut State, now: f32, erpm_factor: f32) {
        state.wheelslip = true;
        self.data.accelstartval = m.acceleration;
        self.data.highaccelon = true;
        self.data.timeron = now;

        self.debug.debug2 = erpm_factor;
        self.debug.debug6 = m.acceleration / self.debug.freq_factor;
        self.debug.debug9 = m.erpm;
        self.debug.debug3 = m.last_erpm();
        self.debug.debug1 = 0.0;
        self.debug.debug4 = 0.0;
        self.debug.debug8 = 0.0;
        if now - self.debug.aggregate_timer > AGGREGATE_WINDOW {
            self.debug.aggregate_timer = now;
            self.debug.debug5 = 0.0;
        }
        self.debug.debug5 += 1.0;

        debug!(
            "wheelslip on: erpm={} accel={} factor={}",
            m.erpm,
            m.acceleration,
            erpm_factor
        );
    }

    fn deactivate(&mut self, state: &mut State, now: f32, reason: DeactivationReason) -> DeactivationReason {
        state.wheelslip = false;
        self.data.timeroff = now;
        self.data.reverse_wheelslip = false;
        self.debug.debug4 = reason.code() as f32;
        self.debug.debug8 = self.data.timeroff - self.data.timeron;
        self.debug.last_reason = Some(reason);

        debug!(
            "wheelslip off: reason={} after {}s",
            reason.code(),
            self.debug.debug8
        );
        reason
    }

    pub fn data(&self) -> &TractionData {
        &self.data
    }

    pub fn debug(&self) -> &TractionDebug {
        &self.debug
    }
}
