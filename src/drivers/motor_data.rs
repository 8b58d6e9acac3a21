use super::filter::{BiquadFilter, BiquadType};
use super::history::History;
use super::math::sign;
use crate::state::MotorSample;

#[allow(unused_imports)]
use micromath::F32Ext;

pub const ERPM_HISTORY_SIZE: usize = 3;
pub const ACCEL_HISTORY_SIZE: usize = 3;

/// Below this speed the motor is never reported as braking.
const BRAKING_MIN_ERPM: f32 = 250.0;
/// Low-pass cutoff of the averaged motor current (Hz)
const CURRENT_AVG_CUTOFF_HZ: f32 = 3.0;

/// Rolling view of the motor: speed, current, acceleration and their recent
/// history. Updated once per control tick.
pub struct MotorData {
    pub erpm: f32,
    pub abs_erpm: f32,
    pub erpm_sign: f32,
    /// Sign of the averaged ERPM, stable around standstill
    pub erpm_sign_soft: f32,

    pub current: f32,
    pub current_avg: f32,
    pub duty_cycle: f32,
    pub braking: bool,

    /// ERPM per tick, averaged over the acceleration history
    pub acceleration: f32,

    erpm_history: History<ERPM_HISTORY_SIZE>,
    accel_history: History<ACCEL_HISTORY_SIZE>,
    current_biquad: BiquadFilter,
    sample_period: f32,
}

impl MotorData {
    pub fn new(sample_period: f32) -> Self {
        let mut m = Self {
            erpm: 0.0,
            abs_erpm: 0.0,
            erpm_sign: 1.0,
            erpm_sign_soft: 1.0,
            current: 0.0,
            current_avg: 0.0,
            duty_cycle: 0.0,
            braking: false,
            acceleration: 0.0,
            erpm_history: History::new(),
            accel_history: History::new(),
            current_biquad: BiquadFilter::default(),
            sample_period,
        };
        m.configure(sample_period);
        m
    }

    /// `sample_period` is the control tick period in seconds.
    pub fn configure(&mut self, sample_period: f32) {
        self.sample_period = sample_period;
        self.current_biquad
            .configure(BiquadType::Lowpass, CURRENT_AVG_CUTOFF_HZ * sample_period);
    }

    pub fn reset(&mut self) {
        self.erpm = 0.0;
        self.abs_erpm = 0.0;
        self.erpm_sign = 1.0;
        self.erpm_sign_soft = 1.0;
        self.current = 0.0;
        self.current_avg = 0.0;
        self.duty_cycle = 0.0;
        self.braking = false;
        self.acceleration = 0.0;
        self.erpm_history.reset();
        self.accel_history.reset();
        self.current_biquad.reset();
    }

    pub fn update(&mut self, sample: MotorSample) {
        self.erpm = sample.erpm;
        self.abs_erpm = sample.erpm.abs();
        self.erpm_sign = sign(sample.erpm);

        self.current = sample.current;
        self.duty_cycle = sample.duty_cycle.abs();
        self.braking = self.abs_erpm > BRAKING_MIN_ERPM && sign(self.current) != self.erpm_sign;

        // First sample after reset is its own predecessor: zero acceleration
        let (erpm_now, erpm_prev) = self.erpm_history.push(sample.erpm);
        self.accel_history.push(erpm_now - erpm_prev);
        self.acceleration = self.accel_history.mean();

        self.erpm_sign_soft = sign(self.erpm_history.mean());
        self.current_avg = self.current_biquad.process(self.current);
    }

    /// ERPM written on the previous tick.
    pub fn last_erpm(&self) -> f32 {
        self.erpm_history.previous()
    }

    /// Newest per-tick ERPM delta.
    pub fn accel_now(&self) -> f32 {
        self.accel_history.latest()
    }

    /// Per-tick ERPM delta of the previous tick.
    pub fn accel_last(&self) -> f32 {
        self.accel_history.previous()
    }

    /// Averaged acceleration in ERPM/s.
    pub fn erpm_rate(&self) -> f32 {
        if self.sample_period > 0.0 {
            self.acceleration / self.sample_period
        } else {
            0.0
        }
    }
}
