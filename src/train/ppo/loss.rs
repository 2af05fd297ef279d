//! Loss computation functions for PPO
//!
//! The clipped surrogate objective, the (optionally clipped) value loss and
//! the entropy bonus, combined by [`ppo_loss`] into the scalar that the update
//! engine backpropagates.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

use super::stats::TrainingStats;
use crate::buffer::rollout::TensorBatch;

/// Weights and clip ranges of the PPO criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoLossConfig {
    /// PPO clipping parameter (epsilon)
    pub clip_range: f64,

    /// Value function clipping parameter, `None` for plain MSE
    pub clip_range_vf: Option<f64>,

    /// Coefficient for value function loss
    pub vf_coef: f64,

    /// Coefficient for entropy bonus
    pub ent_coef: f64,
}

impl Default for PpoLossConfig {
    fn default() -> Self {
        Self { clip_range: 0.2, clip_range_vf: Some(0.2), vf_coef: 0.5, ent_coef: 0.01 }
    }
}

impl PpoLossConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.clip_range <= 0.0 {
            bail!("clip_range must be positive");
        }
        if let Some(vf) = self.clip_range_vf
            && vf <= 0.0
        {
            bail!("clip_range_vf must be positive");
        }
        if self.vf_coef < 0.0 {
            bail!("vf_coef must be non-negative");
        }
        if self.ent_coef < 0.0 {
            bail!("ent_coef must be non-negative");
        }
        Ok(())
    }

    /// Set the policy ratio clip range
    pub fn clip_range(mut self, clip: f64) -> Self {
        self.clip_range = clip;
        self
    }

    /// Set the value clip range, `None` to disable
    pub fn clip_range_vf(mut self, clip: Option<f64>) -> Self {
        self.clip_range_vf = clip;
        self
    }

    /// Set the value loss coefficient
    pub fn vf_coef(mut self, coef: f64) -> Self {
        self.vf_coef = coef;
        self
    }

    /// Set the entropy bonus coefficient
    pub fn ent_coef(mut self, coef: f64) -> Self {
        self.ent_coef = coef;
        self
    }
}

/// Scalar loss to backpropagate plus its detached diagnostics
#[derive(Debug)]
pub struct LossOutput {
    /// Scalar loss to backpropagate
    pub loss: Tensor,

    /// Detached diagnostics of this minibatch
    pub stats: TrainingStats,
}

/// Compute PPO policy loss with clipping
///
/// Returns (policy_loss, clip_fraction, approx_kl)
///
/// # Arguments
/// * `log_probs` - Log probabilities of actions under current policy
/// * `old_log_probs` - Log probabilities of actions under the collecting policy
/// * `advantages` - Advantage estimates
/// * `clip_range` - PPO clipping parameter (epsilon)
pub fn compute_policy_loss(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_range: f64,
) -> Result<(Tensor, f64, f64)> {
    let ratio = (log_probs - old_log_probs).exp();

    let clipped_ratio = ratio.clamp(1.0 - clip_range, 1.0 + clip_range);
    let surrogate_1 = advantages * &ratio;
    let surrogate_2 = advantages * clipped_ratio;
    let policy_loss = -surrogate_1.minimum(&surrogate_2).mean(Kind::Float);

    let (clip_fraction, approx_kl) = tch::no_grad(|| -> Result<(f64, f64)> {
        let clipped = (&ratio - 1.0).abs().gt(clip_range).to_kind(Kind::Float).mean(Kind::Float);
        let kl = (old_log_probs - log_probs).mean(Kind::Float);
        Ok((f64::try_from(&clipped)?, f64::try_from(&kl)?))
    })?;

    Ok((policy_loss, clip_fraction, approx_kl))
}

/// Compute value function loss with optional clipping
///
/// Returns (value_loss, explained_variance). Clipping keeps the new value
/// prediction within `clip_range_vf` of the collecting policy's estimate and
/// takes the pessimistic (larger) of the two squared errors.
pub fn compute_value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_range_vf: Option<f64>,
) -> Result<(Tensor, f64)> {
    let unclipped = (values - returns).square();
    let value_loss = match clip_range_vf {
        Some(clip) => {
            let values_clipped = old_values + (values - old_values).clamp(-clip, clip);
            let clipped = (values_clipped - returns).square();
            unclipped.maximum(&clipped).mean(Kind::Float)
        }
        None => unclipped.mean(Kind::Float),
    };

    let explained_var = tch::no_grad(|| -> Result<f64> {
        let var_returns = f64::try_from(returns.var(false))?;
        if var_returns == 0.0 {
            // Nothing to explain
            return Ok(1.0);
        }
        let var_residual = f64::try_from((returns - values).var(false))?;
        Ok(1.0 - var_residual / var_returns)
    })?;

    Ok((value_loss, explained_var))
}

/// Compute entropy loss (negative mean entropy, minimized)
pub fn compute_entropy_loss(entropy: &Tensor) -> Tensor {
    -entropy.mean(Kind::Float)
}

/// Full PPO criterion for one minibatch
///
/// `loss = policy_loss + vf_coef * value_loss + ent_coef * entropy_loss`
pub fn ppo_loss(
    config: &PpoLossConfig,
    batch: &TensorBatch,
    log_probs: &Tensor,
    entropy: &Tensor,
    values: &Tensor,
) -> Result<LossOutput> {
    let (policy_loss, clip_fraction, approx_kl) =
        compute_policy_loss(log_probs, &batch.old_log_probs, &batch.advantages, config.clip_range)?;
    let (value_loss, explained_var) =
        compute_value_loss(values, &batch.old_values, &batch.returns, config.clip_range_vf)?;
    let entropy_loss = compute_entropy_loss(entropy);

    let loss = &policy_loss + config.vf_coef * &value_loss + config.ent_coef * &entropy_loss;

    let stats = TrainingStats::new(
        f64::try_from(&policy_loss)?,
        f64::try_from(&value_loss)?,
        -f64::try_from(&entropy_loss)?,
        f64::try_from(&loss)?,
        clip_fraction,
        approx_kl,
        explained_var,
    );
    Ok(LossOutput { loss, stats })
}
