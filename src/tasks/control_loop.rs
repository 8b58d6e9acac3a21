#[allow(unused_imports)]
use micromath::F32Ext;

use crate::config::{Config, ConfigError};
use crate::drivers::filter::{BiquadFilter, BiquadType};
use crate::drivers::kalman::KalmanFilter;
use crate::drivers::math::{clampf, sign};
use crate::drivers::motor_data::MotorData;
use crate::drivers::traction::{TractionController, TractionEvent};
use crate::host::{ActuatorSink, Clock, Host, SensorSource};
use crate::state::{AttitudeFilter, MotorSample, RuntimeData, State};
use crate::telemetry::{Telemetry, TelemetrySnapshot};

/// One control-loop instance: owns every filter and state machine and runs
/// them in a fixed order each tick.
pub struct ControlLoop<'t> {
    config: Config,

    rt: RuntimeData,
    state: State,

    // ── Estimators ────────────────────────────────────────────────────────────
    motor: MotorData,
    pitch_biquad: BiquadFilter,
    kalman: KalmanFilter,

    // ── Controllers ───────────────────────────────────────────────────────────
    traction: TractionController,

    telemetry: &'t Telemetry,
    ticks: u32,
}

impl<'t> ControlLoop<'t> {
    pub fn new(config: Config, telemetry: &'t Telemetry) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut cl = Self {
            config,
            rt: RuntimeData::default(),
            state: State::default(),
            motor: MotorData::new(config.sample_period()),
            pitch_biquad: BiquadFilter::default(),
            kalman: KalmanFilter::new(config.kalman()),
            traction: TractionController::new(&config),
            telemetry,
            ticks: 0,
        };
        cl.configure(config)?;
        Ok(cl)
    }

    /// Applies new tuning. Every tick-rate dependent value is derived again
    /// here; filter and traction state is kept.
    pub fn configure(&mut self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;

        self.pitch_biquad
            .configure(BiquadType::Lowpass, config.pitch_filter_frequency());
        self.kalman.configure(config.kalman());
        self.kalman.set_gyro_scale(config.kalman_gyro_scale);
        self.motor.configure(config.sample_period());
        self.traction.configure(&config);

        info!(
            "configured: {} Hz, pitch filter {} Hz, slip start {} erpm/tick",
            config.hertz,
            config.pitch_filter,
            config.start_accel()
        );
        Ok(())
    }

    /// Returns every stage to its start-up state. Estimators are seeded from
    /// the last raw pitch.
    pub fn reset(&mut self) {
        self.motor.reset();

        self.rt.pitch_filtered = self.rt.pitch_angle;
        self.pitch_biquad.reset();
        self.kalman.reset();
        self.kalman.seed(self.rt.pitch_angle);

        self.traction.reset(&mut self.state);
        self.state.braking_pos = false;

        info!("control loop reset, pitch seeded at {}", self.rt.pitch_angle);
    }

    /// Runs until the host asks the package to stop.
    pub fn run<H: Host>(&mut self, host: &mut H) {
        self.reset();
        info!("control loop running at {} Hz", self.config.hertz);

        while !host.should_terminate() {
            self.tick(host);
            host.wait_next_tick();
        }

        info!("control loop terminated after {} ticks", self.ticks);
    }

    /// One control cycle: sensors, motor data, attitude, traction, actuation,
    /// telemetry.
    pub fn tick<H>(&mut self, host: &mut H) -> Option<TractionEvent>
    where
        H: SensorSource + ActuatorSink + Clock,
    {
        self.ticks = self.ticks.wrapping_add(1);

        // ── A. Time ───────────────────────────────────────────────────────────
        let now = host.now();
        self.rt.current_time = now;
        if self.rt.last_time == 0.0 {
            self.rt.last_time = now;
        }
        self.rt.diff_time = now - self.rt.last_time;
        self.rt.last_time = now;

        // ── B. Sensors ────────────────────────────────────────────────────────
        self.rt.gyro = host.gyro();
        self.rt.accel = host.accel();
        self.rt.pitch_angle = host.pitch();
        self.rt.roll_angle = host.roll();

        self.motor.update(MotorSample {
            erpm: host.rpm() as f32,
            current: host.current(),
            duty_cycle: host.duty_cycle(),
        });

        // ── C. Attitude ───────────────────────────────────────────────────────
        self.rt.pitch_filtered = self.filter_pitch();
        self.rt.proportional = self.rt.setpoint - self.rt.pitch_filtered;
        self.state.braking_pos = sign(self.rt.proportional) != self.motor.erpm_sign;

        // ── D. Traction ───────────────────────────────────────────────────────
        let event = self.traction.check(&self.motor, &mut self.state, now);

        // ── E. Actuation ──────────────────────────────────────────────────────
        self.actuate(host);

        // ── F. Publish ────────────────────────────────────────────────────────
        self.telemetry.publish(self.snapshot());

        event
    }

    fn filter_pitch(&mut self) -> f32 {
        let raw = self.rt.pitch_angle;
        match self.config.attitude_filter {
            AttitudeFilter::None => raw,
            AttitudeFilter::Biquad => self.pitch_biquad.process(raw),
            AttitudeFilter::Kalman => self.kalman.apply(raw, self.rt.gyro[1], self.rt.diff_time),
            AttitudeFilter::Both => {
                let fused = self.kalman.apply(raw, self.rt.gyro[1], self.rt.diff_time);
                self.pitch_biquad.process(fused)
            }
        }
    }

    /// Speed limiting with a tighter limit during wheelslip, and a brake
    /// response when the chassis itself starts sliding.
    fn actuate<A: ActuatorSink>(&self, out: &mut A) {
        let v = &self.config.vehicle;
        let m = &self.motor;

        let mut max_erpm = v.max_erpm_base + m.acceleration * v.accel_factor + m.current_avg * v.speed_factor;
        if self.state.wheelslip {
            max_erpm *= v.wheelslip_erpm_scale;
        }

        let [ax, ay, _] = self.rt.accel;
        let planar_accel = (ax * ax + ay * ay).sqrt();
        let chassis_slip = self.rt.gyro[1].abs() > v.max_gyro_y || planar_accel > v.max_accel;

        let reduced_duty = clampf(
            m.erpm_sign * m.duty_cycle * v.duty_reduction,
            -self.config.duty_max,
            self.config.duty_max,
        );

        if chassis_slip {
            out.set_current(self.clamp_current(v.brake_current));
            out.set_duty_cycle(reduced_duty);
        } else {
            out.set_current(0.0);
            if m.abs_erpm > max_erpm {
                out.set_duty_cycle(reduced_duty);
            }
        }
    }

    fn clamp_current(&self, amps: f32) -> f32 {
        clampf(amps, -self.config.current_min, self.config.current_max)
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            time: self.rt.current_time,
            gyro: self.rt.gyro,
            accel: self.rt.accel,
            duty_cycle: self.motor.duty_cycle,
            current: self.motor.current,
            braking: self.motor.braking,
            abs_erpm: self.motor.abs_erpm,
            acceleration: self.motor.acceleration,
            erpm_rate: self.motor.erpm_rate(),
            current_avg: self.motor.current_avg,
            wheelslip: self.state.wheelslip,
            pitch_angle: self.rt.pitch_angle,
            pitch_filtered: self.rt.pitch_filtered,
            traction: *self.traction.debug(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn runtime(&self) -> &RuntimeData {
        &self.rt
    }

    pub fn motor(&self) -> &MotorData {
        &self.motor
    }

    pub fn traction(&self) -> &TractionController {
        &self.traction
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[derive(Default)]
    struct Bench {
        now: f32,
        gyro: [f32; 3],
        accel: [f32; 3],
        pitch: f32,
        rpm: i32,
        current: f32,
        duty: f32,
        set_current: Vec<f32>,
        set_duty: Vec<f32>,
    }

    impl SensorSource for Bench {
        fn gyro(&mut self) -> [f32; 3] {
            self.gyro
        }
        fn accel(&mut self) -> [f32; 3] {
            self.accel
        }
        fn pitch(&mut self) -> f32 {
            self.pitch
        }
        fn roll(&mut self) -> f32 {
            0.0
        }
        fn rpm(&mut self) -> i32 {
            self.rpm
        }
        fn current(&mut self) -> f32 {
            self.current
        }
        fn duty_cycle(&mut self) -> f32 {
            self.duty
        }
    }

    impl ActuatorSink for Bench {
        fn set_current(&mut self, amps: f32) {
            self.set_current.push(amps);
        }
        fn set_duty_cycle(&mut self, duty: f32) {
            self.set_duty.push(duty);
        }
    }

    impl Clock for Bench {
        fn now(&self) -> f32 {
            self.now
        }
    }

    fn bench() -> Bench {
        Bench {
            now: 1.0,
            accel: [0.0, 0.0, 1.0],
            rpm: 2000,
            current: 10.0,
            duty: 0.3,
            ..Bench::default()
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let telemetry = Telemetry::new();
        let config = Config {
            hertz: 0,
            ..Config::default()
        };
        assert!(matches!(
            ControlLoop::new(config, &telemetry),
            Err(ConfigError::InvalidTickRate)
        ));
    }

    #[test]
    fn first_tick_has_zero_dt() {
        let telemetry = Telemetry::new();
        let mut cl = ControlLoop::new(Config::default(), &telemetry).unwrap();
        let mut b = bench();
        cl.tick(&mut b);
        assert_eq!(cl.runtime().diff_time, 0.0);
        b.now += 0.001;
        cl.tick(&mut b);
        assert_abs_diff_eq!(cl.runtime().diff_time, 0.001, epsilon = 1e-6);
    }

    #[test]
    fn cruising_only_releases_current() {
        let telemetry = Telemetry::new();
        let mut cl = ControlLoop::new(Config::default(), &telemetry).unwrap();
        let mut b = bench();
        cl.tick(&mut b);
        assert_eq!(b.set_current, vec![0.0]);
        assert!(b.set_duty.is_empty());
    }

    #[test]
    fn over_speed_reduces_duty() {
        let telemetry = Telemetry::new();
        let mut cl = ControlLoop::new(Config::default(), &telemetry).unwrap();
        let mut b = Bench {
            rpm: 15_000,
            duty: 0.8,
            ..bench()
        };
        cl.tick(&mut b);
        assert_eq!(b.set_duty.len(), 1);
        assert_abs_diff_eq!(b.set_duty[0], 0.72, epsilon = 1e-6);
    }

    #[test]
    fn chassis_slip_brakes() {
        let telemetry = Telemetry::new();
        let mut cl = ControlLoop::new(Config::default(), &telemetry).unwrap();
        let mut b = Bench {
            gyro: [0.0, 150.0, 0.0],
            rpm: -3000,
            duty: 0.5,
            ..bench()
        };
        cl.tick(&mut b);
        assert_eq!(b.set_current, vec![0.8]);
        assert_abs_diff_eq!(b.set_duty[0], -0.45, epsilon = 1e-6);
    }

    #[test]
    fn duty_commands_respect_limit() {
        let telemetry = Telemetry::new();
        let config = Config {
            duty_max: 0.5,
            ..Config::default()
        };
        let mut cl = ControlLoop::new(config, &telemetry).unwrap();
        let mut b = Bench {
            rpm: 20_000,
            duty: 0.9,
            ..bench()
        };
        cl.tick(&mut b);
        assert_eq!(b.set_duty, vec![0.5]);
    }

    #[test]
    fn kalman_mode_tracks_pitch() {
        let telemetry = Telemetry::new();
        let config = Config {
            attitude_filter: AttitudeFilter::Kalman,
            ..Config::default()
        };
        let mut cl = ControlLoop::new(config, &telemetry).unwrap();
        let mut b = Bench { pitch: 4.0, ..bench() };
        for _ in 0..3000 {
            cl.tick(&mut b);
            b.now += 0.001;
        }
        assert_abs_diff_eq!(cl.runtime().pitch_filtered, 4.0, epsilon = 0.05);
    }

    #[test]
    fn unfiltered_mode_passes_raw_pitch() {
        let telemetry = Telemetry::new();
        let config = Config {
            attitude_filter: AttitudeFilter::None,
            ..Config::default()
        };
        let mut cl = ControlLoop::new(config, &telemetry).unwrap();
        let mut b = Bench { pitch: 3.0, ..bench() };
        cl.tick(&mut b);
        assert_eq!(cl.runtime().pitch_filtered, 3.0);

        b.pitch = -7.25;
        b.now += 0.001;
        cl.tick(&mut b);
        assert_eq!(cl.runtime().pitch_filtered, -7.25);
        assert_eq!(cl.runtime().proportional, 7.25);
    }

    #[test]
    fn fused_mode_settles_and_survives_reset() {
        let telemetry = Telemetry::new();
        let config = Config {
            attitude_filter: AttitudeFilter::Both,
            ..Config::default()
        };
        let mut cl = ControlLoop::new(config, &telemetry).unwrap();
        let mut b = Bench { pitch: 4.0, ..bench() };
        for _ in 0..3000 {
            cl.tick(&mut b);
            assert!(cl.runtime().pitch_filtered.is_finite());
            b.now += 0.001;
        }
        assert_abs_diff_eq!(cl.runtime().pitch_filtered, 4.0, epsilon = 0.05);

        cl.reset();
        for _ in 0..500 {
            cl.tick(&mut b);
            assert!(cl.runtime().pitch_filtered.is_finite());
            b.now += 0.001;
        }
        assert_abs_diff_eq!(cl.runtime().pitch_filtered, 4.0, epsilon = 0.05);
    }

    #[test]
    fn reset_seeds_pitch_and_clears_slip() {
        let telemetry = Telemetry::new();
        let mut cl = ControlLoop::new(Config::default(), &telemetry).unwrap();
        let mut b = Bench { pitch: -2.5, ..bench() };
        cl.tick(&mut b);
        cl.reset();
        assert_eq!(cl.runtime().pitch_filtered, -2.5);
        assert!(!cl.state().wheelslip);
        assert_eq!(cl.motor().abs_erpm, 0.0);
    }

    #[test]
    fn publishes_every_tick() {
        let telemetry = Telemetry::new();
        let mut cl = ControlLoop::new(Config::default(), &telemetry).unwrap();
        let mut b = Bench { now: 3.5, ..bench() };
        cl.tick(&mut b);
        assert_eq!(telemetry.debug_value(1), 3.5);
        assert_eq!(telemetry.debug_value(11), 2000.0);
        assert_eq!(telemetry.debug_value(14), 0.0);
    }
}
