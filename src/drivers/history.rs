/// Fixed-capacity ring of the last `N` samples.
///
/// `push` returns the sample just written together with the one written on the
/// previous call, so callers always compare against exactly one tick of lag.
/// The first push after construction or `reset` reports itself as its own
/// predecessor.
#[derive(Clone, Copy, Debug)]
pub struct History<const N: usize> {
    samples: [f32; N],
    idx: usize,
    last_idx: usize,
    len: usize,
}

impl<const N: usize> History<N> {
    pub const fn new() -> Self {
        assert!(N >= 2, "history needs room for current and previous sample");
        Self {
            samples: [0.0; N],
            idx: 0,
            last_idx: 0,
            len: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Writes `value` and returns `(current, previous)`.
    pub fn push(&mut self, value: f32) -> (f32, f32) {
        if self.len == 0 {
            self.idx = 0;
            self.last_idx = 0;
        } else {
            self.last_idx = self.idx;
            self.idx = (self.idx + 1) % N;
        }
        self.samples[self.idx] = value;
        self.len = (self.len + 1).min(N);
        (self.samples[self.idx], self.samples[self.last_idx])
    }

    /// Most recent sample, 0 when empty.
    pub fn latest(&self) -> f32 {
        self.samples[self.idx]
    }

    /// Sample written one push before the latest.
    pub fn previous(&self) -> f32 {
        self.samples[self.last_idx]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Mean of the stored samples, 0 when empty.
    pub fn mean(&self) -> f32 {
        if self.len == 0 {
            return 0.0;
        }
        let sum: f32 = self.iter().sum();
        sum / self.len as f32
    }

    /// Stored samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let start = (self.idx + N + 1 - self.len) % N;
        (0..self.len).map(move |i| self.samples[(start + i) % N])
    }
}

impl<const N: usize> Default for History<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_push_is_its_own_predecessor() {
        let mut h = History::<3>::new();
        assert_eq!(h.push(42.0), (42.0, 42.0));
        assert_eq!(h.latest(), 42.0);
        assert_eq!(h.previous(), 42.0);
    }

    #[test]
    fn push_reports_one_sample_of_lag() {
        let mut h = History::<3>::new();
        h.push(1.0);
        assert_eq!(h.push(2.0), (2.0, 1.0));
        assert_eq!(h.push(3.0), (3.0, 2.0));
        // wraps around the capacity
        assert_eq!(h.push(4.0), (4.0, 3.0));
        assert_eq!(h.push(5.0), (5.0, 4.0));
    }

    #[test]
    fn iter_is_oldest_first_after_wrap() {
        let mut h = History::<3>::new();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            h.push(v);
        }
        let got: Vec<f32> = h.iter().collect();
        assert_eq!(got, vec![3.0, 4.0, 5.0]);
        assert_eq!(h.len(), 3);
        assert_eq!(h.mean(), 4.0);
    }

    #[test]
    fn partial_fill_mean_uses_written_samples_only() {
        let mut h = History::<5>::new();
        h.push(2.0);
        h.push(4.0);
        assert_eq!(h.mean(), 3.0);
        let got: Vec<f32> = h.iter().collect();
        assert_eq!(got, vec![2.0, 4.0]);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut h = History::<3>::new();
        h.push(7.0);
        h.push(-7.0);
        h.reset();
        assert!(h.is_empty());
        assert_eq!(h.mean(), 0.0);
        assert_eq!(h.push(1.0), (1.0, 1.0));
    }
}
