//! Categorical action distribution over discrete actions

use tch::{Kind, Tensor};

/// Batched categorical distribution parameterized by logits `[B, num_actions]`
#[derive(Debug)]
pub struct Categorical {
    log_probs: Tensor,
}

impl Categorical {
    /// Build from unnormalized logits
    pub fn from_logits(logits: &Tensor) -> Self {
        // log_softmax for numerical stability
        Self { log_probs: logits.log_softmax(-1, Kind::Float) }
    }

    /// Normalized log probabilities of every action `[B, num_actions]`
    pub fn log_probs(&self) -> &Tensor {
        &self.log_probs
    }

    /// Action probabilities `[B, num_actions]`
    pub fn probs(&self) -> Tensor {
        self.log_probs.exp()
    }

    /// Draw one action per row `[B]` (Int64)
    pub fn sample(&self) -> Tensor {
        self.probs().multinomial(1, true).squeeze_dim(-1)
    }

    /// Most likely action per row `[B]` (Int64)
    pub fn mode(&self) -> Tensor {
        self.log_probs.argmax(-1, false)
    }

    /// Log probability of `actions` `[B]`
    pub fn log_prob(&self, actions: &Tensor) -> Tensor {
        self.log_probs.gather(-1, &actions.unsqueeze(-1), false).squeeze_dim(-1)
    }

    /// Per-row entropy `[B]`: `H = -Σ p log p`
    pub fn entropy(&self) -> Tensor {
        -(self.probs() * &self.log_probs).sum_dim_intlist(-1, false, Kind::Float)
    }
}
