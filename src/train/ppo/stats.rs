//! Training statistics for PPO
//!
//! Per-minibatch diagnostics, summed over an update and averaged for logging.

use std::ops::AddAssign;

/// Diagnostics of one (or, summed, several) gradient updates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingStats {
    /// Clipped surrogate loss
    pub policy_loss: f64,

    /// Value function loss
    pub value_loss: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// Weighted sum of policy, value and entropy losses
    pub total_loss: f64,

    /// Fraction of samples whose probability ratio left the clip range
    pub clip_fraction: f64,

    /// Approximate KL divergence between collecting and current policy
    pub approx_kl: f64,

    /// Explained variance of the value predictions
    pub explained_var: f64,

    /// Global gradient norm before clipping
    pub grad_norm: f64,

    /// Number of gradient updates summed into this value
    pub num_updates: usize,
}

impl TrainingStats {
    /// Empty accumulator
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Statistics of a single update
    pub fn new(
        policy_loss: f64,
        value_loss: f64,
        entropy: f64,
        total_loss: f64,
        clip_fraction: f64,
        approx_kl: f64,
        explained_var: f64,
    ) -> Self {
        Self {
            policy_loss,
            value_loss,
            entropy,
            total_loss,
            clip_fraction,
            approx_kl,
            explained_var,
            grad_norm: 0.0,
            num_updates: 1,
        }
    }

    /// Attach the pre-clip gradient norm
    pub fn with_grad_norm(mut self, grad_norm: f64) -> Self {
        self.grad_norm = grad_norm;
        self
    }

    /// Accumulate another set of statistics
    pub fn add(&mut self, other: &TrainingStats) {
        self.policy_loss += other.policy_loss;
        self.value_loss += other.value_loss;
        self.entropy += other.entropy;
        self.total_loss += other.total_loss;
        self.clip_fraction += other.clip_fraction;
        self.approx_kl += other.approx_kl;
        self.explained_var += other.explained_var;
        self.grad_norm += other.grad_norm;
        self.num_updates += other.num_updates;
    }

    /// Mean over the summed updates
    pub fn average(&self) -> Self {
        if self.num_updates == 0 {
            return Self::zeros();
        }
        let scale = self.num_updates as f64;

        Self {
            policy_loss: self.policy_loss / scale,
            value_loss: self.value_loss / scale,
            entropy: self.entropy / scale,
            total_loss: self.total_loss / scale,
            clip_fraction: self.clip_fraction / scale,
            approx_kl: self.approx_kl / scale,
            explained_var: self.explained_var / scale,
            grad_norm: self.grad_norm / scale,
            num_updates: 1,
        }
    }
}

impl AddAssign<&TrainingStats> for TrainingStats {
    fn add_assign(&mut self, other: &TrainingStats) {
        self.add(other);
    }
}
