#[allow(unused_imports)]
use micromath::F32Ext;

/// Butterworth Q used for every biquad in the control loop.
const BIQUAD_Q: f32 = 0.707;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BiquadType {
    Lowpass,
    Highpass,
}

/// Biquad Filter (Second order)
/// Using Direct Form 2 Transpose
///
/// `a*` are the feed-forward and `b*` the feedback coefficients.
#[derive(Clone, Copy, Debug, Default)]
pub struct BiquadFilter {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

impl BiquadFilter {
    /// `frequency` is the cutoff normalized to the sample rate
    /// (`cutoff_hz / sample_hz`) and must lie in `(0, 0.5)`.
    pub fn new(kind: BiquadType, frequency: f32) -> Self {
        let mut filter = Self::default();
        filter.configure(kind, frequency);
        filter
    }

    pub fn new_lpf(cutoff_freq: f32, sample_rate: f32) -> Self {
        Self::new(BiquadType::Lowpass, cutoff_freq / sample_rate)
    }

    /// Recomputes coefficients with `tan(pi * f)` prewarping. Filter state is kept.
    pub fn configure(&mut self, kind: BiquadType, frequency: f32) {
        let k = (core::f32::consts::PI * frequency).tan();
        let norm = 1.0 / (1.0 + k / BIQUAD_Q + k * k);

        match kind {
            BiquadType::Lowpass => {
                self.a0 = k * k * norm;
                self.a1 = 2.0 * self.a0;
                self.a2 = self.a0;
            }
            BiquadType::Highpass => {
                self.a0 = norm;
                self.a1 = -2.0 * self.a0;
                self.a2 = self.a0;
            }
        }
        self.b1 = 2.0 * (k * k - 1.0) * norm;
        self.b2 = (1.0 - k / BIQUAD_Q + k * k) * norm;
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let output = input * self.a0 + self.z1;
        self.z1 = input * self.a1 + self.z2 - self.b1 * output;
        self.z2 = input * self.a2 - self.b2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
