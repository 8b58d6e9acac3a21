//! Interfaces the motor controller firmware provides to the control loop.

/// Snapshot reads of the IMU and motor; none of these block.
pub trait SensorSource {
    fn gyro(&mut self) -> [f32; 3];
    fn accel(&mut self) -> [f32; 3];
    /// Pitch from the host attitude estimator (deg)
    fn pitch(&mut self) -> f32;
    fn roll(&mut self) -> f32;
    fn rpm(&mut self) -> i32;
    /// Directional, filtered motor current (A)
    fn current(&mut self) -> f32;
    fn duty_cycle(&mut self) -> f32;
}

/// Motor commands. Each call also feeds the host's command timeout.
pub trait ActuatorSink {
    fn set_current(&mut self, amps: f32);
    fn set_duty_cycle(&mut self, duty: f32);
}

/// Monotonic time in seconds.
pub trait Clock {
    fn now(&self) -> f32;
}

/// Everything a control-loop thread needs from the firmware.
pub trait Host: SensorSource + ActuatorSink + Clock {
    /// Set by the firmware when the package is being stopped.
    fn should_terminate(&self) -> bool;
    /// Sleeps until the next tick is due.
    fn wait_next_tick(&mut self);
}
