/// Gyro LSB per deg/s for the ±250 dps range of the board IMU.
pub const DEFAULT_GYRO_SCALE: f32 = 131.0;

/// Noise tuning for [`KalmanFilter`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KalmanConfig {
    /// Q: process noise of the angle state
    pub q_angle: f32,
    /// Q: process noise of the gyro bias state
    pub q_bias: f32,
    /// R: measurement noise of the absolute angle
    pub r_measure: f32,
}

impl KalmanConfig {
    /// Converts the integer-friendly tuning factors stored in the motor
    /// controller configuration into noise variances.
    pub fn from_factors(factor1: f32, factor2: f32, factor3: f32) -> Self {
        Self {
            q_angle: factor1 / 10_000.0,
            q_bias: factor2 / 10_000.0,
            r_measure: factor3 / 100_000.0,
        }
    }
}

/// Two-state (angle, gyro bias) Kalman filter fusing a rate gyro with an
/// absolute angle measurement.
pub struct KalmanFilter {
    angle: f32,
    bias: f32,

    // Covariance matrix P (2x2)
    p00: f32,
    p01: f32,
    p10: f32,
    p11: f32,

    q_angle: f32,
    q_bias: f32,
    r_measure: f32,

    gyro_scale: f32,
}

impl KalmanFilter {
    pub fn new(config: KalmanConfig) -> Self {
        Self {
            angle: 0.0,
            bias: 0.0,
            p00: 0.0,
            p01: 0.0,
            p10: 0.0,
            p11: 0.0,
            q_angle: config.q_angle,
            q_bias: config.q_bias,
            r_measure: config.r_measure,
            gyro_scale: DEFAULT_GYRO_SCALE,
        }
    }

    /// Divisor turning raw gyro readings into deg/s.
    pub fn with_gyro_scale(mut self, gyro_scale: f32) -> Self {
        self.gyro_scale = gyro_scale;
        self
    }

    pub fn configure(&mut self, config: KalmanConfig) {
        self.q_angle = config.q_angle;
        self.q_bias = config.q_bias;
        self.r_measure = config.r_measure;
    }

    pub fn set_gyro_scale(&mut self, gyro_scale: f32) {
        self.gyro_scale = gyro_scale;
    }

    /// Zeroes covariance and bias. The angle estimate is left alone; use
    /// [`seed`](Self::seed) to start it from a raw measurement.
    pub fn reset(&mut self) {
        self.p00 = 0.0;
        self.p01 = 0.0;
        self.p10 = 0.0;
        self.p11 = 0.0;
        self.bias = 0.0;
    }

    pub fn seed(&mut self, angle: f32) {
        self.angle = angle;
    }

    /// One predict + correct step.
    ///
    /// `gyro_rate` is raw sensor units, `dt` in seconds. Returns the filtered angle.
    pub fn apply(&mut self, angle_measurement: f32, gyro_rate: f32, dt: f32) -> f32 {
        // Predict: integrate the bias-corrected rate
        let rate = gyro_rate / self.gyro_scale - self.bias;
        self.angle += dt * rate;

        // P = F*P*F' + Q with F = [[1, -dt], [0, 1]]
        self.p00 += dt * (dt * self.p11 - self.p01 - self.p10 + self.q_angle);
        self.p01 -= dt * self.p11;
        self.p10 -= dt * self.p11;
        self.p11 += self.q_bias * dt;

        // H = [1, 0]
        let s = self.p00 + self.r_measure;
        let k0 = self.p00 / s;
        let k1 = self.p10 / s;

        let y = angle_measurement - self.angle;
        self.angle += k0 * y;
        self.bias += k1 * y;

        // P = (I - KH)P, rows updated from the pre-update first row
        let p00 = self.p00;
        let p01 = self.p01;

        self.p00 -= k0 * p00;
        self.p01 -= k0 * p01;
        self.p10 -= k1 * p00;
        self.p11 -= k1 * p01;

        self.angle
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn covariance(&self) -> [[f32; 2]; 2] {
        [[self.p00, self.p01], [self.p10, self.p11]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tuned() -> KalmanFilter {
        KalmanFilter::new(KalmanConfig::from_factors(10.0, 30.0, 2000.0))
    }

    #[test]
    fn factors_are_scaled() {
        let cfg = KalmanConfig::from_factors(10.0, 30.0, 2000.0);
        assert_abs_diff_eq!(cfg.q_angle, 0.001);
        assert_abs_diff_eq!(cfg.q_bias, 0.003);
        assert_abs_diff_eq!(cfg.r_measure, 0.02);
    }

    #[test]
    fn converges_on_constant_measurement() {
        let mut k = tuned();
        k.seed(0.0);
        for _ in 0..5000 {
            k.apply(12.0, 0.0, 0.001);
        }
        assert_abs_diff_eq!(k.angle(), 12.0, epsilon = 0.05);
        assert_abs_diff_eq!(k.bias(), 0.0, epsilon = 0.05);
    }

    #[test]
    fn learns_a_constant_gyro_bias() {
        let mut k = tuned();
        // 2 deg/s of drift while the board sits level
        let raw_bias = 2.0 * DEFAULT_GYRO_SCALE;
        for _ in 0..20_000 {
            k.apply(0.0, raw_bias, 0.001);
        }
        assert_abs_diff_eq!(k.bias(), 2.0, epsilon = 0.1);
        assert_abs_diff_eq!(k.angle(), 0.0, epsilon = 0.05);
    }

    #[test]
    fn reset_keeps_angle() {
        let mut k = tuned();
        k.seed(3.0);
        k.apply(5.0, 100.0, 0.01);
        let angle = k.angle();
        k.reset();
        assert_eq!(k.angle(), angle);
        assert_eq!(k.bias(), 0.0);
        assert_eq!(k.covariance(), [[0.0, 0.0], [0.0, 0.0]]);
    }

    #[test]
    fn covariance_update_reads_pre_update_values() {
        let mut k = tuned();
        k.p00 = 0.5;
        k.p01 = 0.1;
        k.p10 = 0.1;
        k.p11 = 0.2;
        let dt = 0.01;

        // hand-rolled reference with explicit temporaries
        let mut p00 = 0.5f32 + dt * (dt * 0.2 - 0.1 - 0.1 + k.q_angle);
        let mut p01 = 0.1f32 - dt * 0.2;
        let mut p10 = 0.1f32 - dt * 0.2;
        let mut p11 = 0.2f32 + k.q_bias * dt;
        let s = p00 + k.r_measure;
        let (k0, k1) = (p00 / s, p10 / s);
        let (t00, t01) = (p00, p01);
        p00 -= k0 * t00;
        p01 -= k0 * t01;
        p10 -= k1 * t00;
        p11 -= k1 * t01;

        k.apply(1.0, 0.0, dt);
        let p = k.covariance();
        assert_abs_diff_eq!(p[0][0], p00, epsilon = 1e-7);
        assert_abs_diff_eq!(p[0][1], p01, epsilon = 1e-7);
        assert_abs_diff_eq!(p[1][0], p10, epsilon = 1e-7);
        assert_abs_diff_eq!(p[1][1], p11, epsilon = 1e-7);
    }

    #[test]
    fn custom_gyro_scale_is_used_for_prediction() {
        let mut k = KalmanFilter::new(KalmanConfig {
            q_angle: 0.0,
            q_bias: 0.0,
            r_measure: 1.0,
        })
        .with_gyro_scale(10.0);
        // zero covariance -> zero gain, pure integration of 100/10 deg/s
        let angle = k.apply(0.0, 100.0, 0.5);
        assert_abs_diff_eq!(angle, 5.0);
    }
}
