//! Multi-Layer Perceptron (MLP) actor-critic for discrete actions
//!
//! Observations of any shape are flattened per sample before the shared
//! trunk. The trunk feeds a policy head (action logits) and a value head.
//!
//! # Architecture
//!
//! ```text
//! Input (observations, flattened)
//!         |
//!     [Dense(hidden)] -> act -> [Dropout]
//!         |
//!     [Dense(hidden)] -> act -> [Dropout]
//!         |
//!     [Dense(hidden)] -> act -> [Dropout]   (optional 3rd layer)
//!      /     \
//!  Policy   Value
//!     |        |
//! [Dense(n)]  [Dense(1)]
//! ```
//!
//! Dropout is only applied in [`Mode::Train`].

use std::path::Path;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tch::{
    Device, Tensor,
    nn::{self, Init, Module, ModuleT, OptimizerConfig},
};

use super::{ActorCritic, Categorical, Mode};
use crate::buffer::rollout::TensorBatch;
use crate::train::ppo::loss::{LossOutput, PpoLossConfig, ppo_loss};

/// Configuration for MLP policy architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpConfig {
    /// Number of hidden layers in the shared trunk
    pub num_layers: usize,

    /// Width of each hidden layer
    pub hidden_dim: i64,

    /// Orthogonal weight init for every linear layer
    pub use_orthogonal_init: bool,

    /// Hidden-layer nonlinearity
    pub activation: Activation,

    /// Dropout probability after each hidden layer, 0 disables it
    pub dropout: f64,
}

/// Hidden-layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified linear unit
    ReLU,

    /// Hyperbolic tangent
    Tanh,
}

impl Activation {
    fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Activation::ReLU => x.relu(),
            Activation::Tanh => x.tanh(),
        }
    }
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            num_layers: 2,
            hidden_dim: 64,
            use_orthogonal_init: true,
            activation: Activation::Tanh,
            dropout: 0.0,
        }
    }
}

impl MlpConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(2..=3).contains(&self.num_layers) {
            bail!("num_layers must be 2 or 3, got {}", self.num_layers);
        }
        if self.hidden_dim <= 0 {
            bail!("hidden_dim must be positive");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1)");
        }
        Ok(())
    }

    /// Set the hidden layer width
    pub fn hidden_dim(mut self, dim: i64) -> Self {
        self.hidden_dim = dim;
        self
    }

    /// Set the number of hidden layers
    pub fn num_layers(mut self, n: usize) -> Self {
        self.num_layers = n;
        self
    }

    /// Set the activation function
    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Set the trunk dropout probability
    pub fn dropout(mut self, p: f64) -> Self {
        self.dropout = p;
        self
    }
}

/// Actor-critic MLP over flattened observations
///
/// - Shared trunk of 2-3 layers with orthogonal init (gain √2)
/// - Policy head producing action logits (gain 0.01)
/// - Value head producing a scalar estimate (gain 0.01)
/// - PPO criterion configured by [`PpoLossConfig`]
pub struct MlpPolicy {
    vs: nn::VarStore,
    shared: nn::SequentialT,
    policy_head: nn::Linear,
    value_head: nn::Linear,
    device: Device,
    obs_dim: i64,
    num_actions: i64,
    loss_config: PpoLossConfig,
}

impl MlpPolicy {
    /// Build on the best available device (CUDA if present)
    pub fn new(obs_shape: &[usize], num_actions: usize, config: MlpConfig) -> Result<Self> {
        Self::on_device(obs_shape, num_actions, config, Device::cuda_if_available())
    }

    /// Build on an explicit device
    pub fn on_device(
        obs_shape: &[usize],
        num_actions: usize,
        config: MlpConfig,
        device: Device,
    ) -> Result<Self> {
        config.validate()?;
        if num_actions == 0 {
            bail!("num_actions must be positive");
        }
        tracing::info!("MlpPolicy using device: {:?}", device);

        let obs_dim = obs_shape.iter().product::<usize>() as i64;
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let hidden_init = if config.use_orthogonal_init {
            Init::Orthogonal { gain: 2.0_f64.sqrt() }
        } else {
            Init::Randn { mean: 0.0, stdev: 0.01 }
        };
        let linear_config = nn::LinearConfig { ws_init: hidden_init, ..Default::default() };

        let mut shared = nn::seq_t();
        let mut in_dim = obs_dim;
        for layer in 1..=config.num_layers {
            let activation = config.activation;
            let p = config.dropout;
            shared = shared
                .add(nn::linear(&root / "shared" / format!("fc{layer}"), in_dim, config.hidden_dim, linear_config))
                .add_fn(move |x| activation.apply(x));
            if p > 0.0 {
                shared = shared.add_fn_t(move |x, train| x.dropout(p, train));
            }
            in_dim = config.hidden_dim;
        }

        // Smaller gain for the output layers
        let output_init = if config.use_orthogonal_init {
            Init::Orthogonal { gain: 0.01 }
        } else {
            Init::Randn { mean: 0.0, stdev: 0.01 }
        };
        let output_config = nn::LinearConfig { ws_init: output_init, ..Default::default() };

        let num_actions = num_actions as i64;
        let policy_head = nn::linear(&root / "policy", config.hidden_dim, num_actions, output_config);
        let value_head = nn::linear(&root / "value", config.hidden_dim, 1, output_config);

        Ok(Self {
            vs,
            shared,
            policy_head,
            value_head,
            device,
            obs_dim,
            num_actions,
            loss_config: PpoLossConfig::default(),
        })
    }

    /// Replace the PPO loss settings
    pub fn with_loss(mut self, loss_config: PpoLossConfig) -> Self {
        self.loss_config = loss_config;
        self
    }

    /// PPO loss settings
    pub fn loss_config(&self) -> &PpoLossConfig {
        &self.loss_config
    }

    /// Flattened observation size
    pub fn obs_dim(&self) -> i64 {
        self.obs_dim
    }

    /// Number of discrete actions
    pub fn num_actions(&self) -> i64 {
        self.num_actions
    }

    /// Raw logits and values for a batch of observations
    pub fn logits_and_values(&self, obs: &Tensor, mode: Mode) -> (Tensor, Tensor) {
        let flat = obs.flatten(1, -1);
        let features = self.shared.forward_t(&flat, mode.is_train());
        let logits = self.policy_head.forward(&features);
        let values = self.value_head.forward(&features).squeeze_dim(-1);
        (logits, values)
    }

    /// Adam over all parameters
    pub fn optimizer(&self, learning_rate: f64, eps: f64) -> Result<nn::Optimizer> {
        let adam = nn::Adam { eps, ..Default::default() };
        Ok(adam.build(&self.vs, learning_rate)?)
    }

    /// Save model parameters to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    /// Load model parameters from a file
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.vs.load(path)?;
        Ok(())
    }
}

impl ActorCritic for MlpPolicy {
    fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, observations: &Tensor, mode: Mode) -> (Categorical, Tensor) {
        let (logits, values) = self.logits_and_values(observations, mode);
        (Categorical::from_logits(&logits), values)
    }

    fn criterion(&self, batch: &TensorBatch, dist: &Categorical, values: &Tensor) -> Result<LossOutput> {
        let log_probs = dist.log_prob(&batch.actions);
        let entropy = dist.entropy();
        ppo_loss(&self.loss_config, batch, &log_probs, &entropy, values)
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}
