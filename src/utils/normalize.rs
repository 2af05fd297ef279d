//! Running statistics for reward scaling
//!
//! Tracks mean and variance of a scalar stream with the parallel (batched)
//! form of Welford's algorithm.

/// Running mean and variance of a scalar quantity
#[derive(Debug, Clone)]
pub struct RunningMeanStd {
    mean: f64,
    var: f64,
    count: f64,
}

impl Default for RunningMeanStd {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningMeanStd {
    /// Create an empty tracker
    ///
    /// The count starts at a small epsilon so the first update is not a
    /// division by zero.
    pub fn new() -> Self {
        Self { mean: 0.0, var: 1.0, count: 1e-4 }
    }

    /// Update statistics with a batch of samples
    pub fn update(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let batch_count = samples.len() as f64;
        let batch_mean = samples.iter().map(|&x| x as f64).sum::<f64>() / batch_count;
        let batch_var = samples
            .iter()
            .map(|&x| (x as f64 - batch_mean).powi(2))
            .sum::<f64>()
            / batch_count;

        let delta = batch_mean - self.mean;
        let total_count = self.count + batch_count;

        self.mean += delta * batch_count / total_count;
        let m_a = self.var * self.count;
        let m_b = batch_var * batch_count;
        let m2 = m_a + m_b + delta.powi(2) * self.count * batch_count / total_count;
        self.var = m2 / total_count;
        self.count = total_count;
    }

    /// Current mean
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Current variance
    pub fn var(&self) -> f64 {
        self.var
    }

    /// Standard deviation with `epsilon` added to the variance
    pub fn std(&self, epsilon: f64) -> f64 {
        (self.var + epsilon).sqrt()
    }

    /// Number of samples seen
    pub fn count(&self) -> f64 {
        self.count
    }
}
