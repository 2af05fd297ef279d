//! Actor-critic models
//!
//! The training loop only talks to models through [`ActorCritic`]; the
//! network architecture stays behind that trait. [`mlp::MlpPolicy`] is the
//! bundled implementation.

pub mod distribution;
pub mod mlp;

use anyhow::Result;
use tch::{Device, Kind, Tensor, nn};

pub use distribution::Categorical;

use crate::buffer::rollout::TensorBatch;
use crate::train::ppo::loss::LossOutput;

/// Execution mode for a forward pass
///
/// Passed explicitly so a model never carries a hidden train/eval flag.
/// Layers such as dropout are only active in [`Mode::Train`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Eval,
    Train,
}

impl Mode {
    /// Whether training-only layers are active
    pub fn is_train(self) -> bool {
        self == Mode::Train
    }
}

/// Host-side result of [`ActorCritic::act`] for a batch of instances
#[derive(Debug, Clone, PartialEq)]
pub struct ActOutput {
    /// Sampled actions `[B]`
    pub actions: Vec<i64>,

    /// Log probabilities of the sampled actions `[B]`
    pub log_probs: Vec<f32>,

    /// Value estimates `[B]`
    pub values: Vec<f32>,
}

/// Policy/value model driven by the training loop
pub trait ActorCritic {
    /// Device the parameters live on
    fn device(&self) -> Device;

    /// Action distribution and value estimate `[B]` for a batch of observations
    fn forward(&self, observations: &Tensor, mode: Mode) -> (Categorical, Tensor);

    /// Scalar training loss for one minibatch, from a `Mode::Train` forward pass
    fn criterion(&self, batch: &TensorBatch, dist: &Categorical, values: &Tensor)
    -> Result<LossOutput>;

    /// Trainable parameters
    fn var_store(&self) -> &nn::VarStore;

    /// Sample actions in evaluation mode without recording gradients
    fn act(&self, observations: &Tensor) -> Result<ActOutput> {
        tch::no_grad(|| {
            let (dist, values) = self.forward(observations, Mode::Eval);
            let actions = dist.sample();
            let log_probs = dist.log_prob(&actions);

            Ok(ActOutput {
                actions: Vec::try_from(actions.to_device(Device::Cpu))?,
                log_probs: Vec::try_from(log_probs.to_kind(Kind::Float).to_device(Device::Cpu))?,
                values: Vec::try_from(values.to_kind(Kind::Float).to_device(Device::Cpu))?,
            })
        })
    }
}

/// Turn a stacked host observation buffer into a `[num_envs, *shape]` tensor
pub fn obs_to_tensor(observations: &[f32], num_envs: usize, shape: &[usize], device: Device) -> Result<Tensor> {
    let mut dims = vec![num_envs as i64];
    dims.extend(shape.iter().map(|&d| d as i64));
    Ok(Tensor::from_slice(observations).f_reshape(dims.as_slice())?.to_device(device))
}
