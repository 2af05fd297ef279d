//! Training-loop configuration and hyperparameters
//!
//! Defaults follow common settings for procedurally generated benchmarks with
//! a few dozen parallel instances.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::buffer::rollout::StoreConfig;

/// Hyperparameters of the outer training loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Passes over each rollout per update
    pub num_epochs: usize,

    /// Minibatch size
    pub batch_size: usize,

    /// Adam learning rate
    pub adam_lr: f64,

    /// Adam epsilon
    pub adam_eps: f64,

    /// Rollout length per instance
    pub num_steps: usize,

    /// Environment step budget, counted across all instances
    pub total_steps: usize,

    /// Maximum global gradient norm
    pub grad_eps: f64,

    /// Discount factor
    pub gamma: f64,

    /// GAE lambda parameter
    pub lam: f64,

    /// Standardize advantages over each rollout
    pub normalize_advantage: bool,

    /// Evaluate on a held-out environment at every report
    pub eval: bool,

    /// Report every this many updates instead of the automatic cadence
    pub log_interval: Option<usize>,

    /// Seed for minibatch shuffling and action sampling
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_epochs: 3,
            batch_size: 512,
            adam_lr: 5e-4,
            adam_eps: 1e-5,
            num_steps: 256,
            total_steps: 1_000_000,
            grad_eps: 0.5,
            gamma: 0.99,
            lam: 0.95,
            normalize_advantage: true,
            eval: false,
            log_interval: None,
            seed: None,
        }
    }
}

impl TrainConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            return Err(anyhow!("num_epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if self.adam_lr <= 0.0 {
            return Err(anyhow!("adam_lr must be positive"));
        }
        if self.adam_eps <= 0.0 {
            return Err(anyhow!("adam_eps must be positive"));
        }
        if self.num_steps == 0 {
            return Err(anyhow!("num_steps must be positive"));
        }
        if self.grad_eps <= 0.0 {
            return Err(anyhow!("grad_eps must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(anyhow!("gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.lam) {
            return Err(anyhow!("lam must be in [0, 1]"));
        }
        if self.log_interval == Some(0) {
            return Err(anyhow!("log_interval must be positive"));
        }
        Ok(())
    }

    /// Return/advantage settings for the trajectory store
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig { gamma: self.gamma, lam: self.lam, normalize_advantage: self.normalize_advantage }
    }

    /// Set the number of epochs per update
    pub fn num_epochs(mut self, epochs: usize) -> Self {
        self.num_epochs = epochs;
        self
    }

    /// Set the minibatch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the Adam learning rate
    pub fn adam_lr(mut self, lr: f64) -> Self {
        self.adam_lr = lr;
        self
    }

    /// Set the Adam epsilon
    pub fn adam_eps(mut self, eps: f64) -> Self {
        self.adam_eps = eps;
        self
    }

    /// Set the rollout length per instance
    pub fn num_steps(mut self, steps: usize) -> Self {
        self.num_steps = steps;
        self
    }

    /// Set the environment step budget
    pub fn total_steps(mut self, steps: usize) -> Self {
        self.total_steps = steps;
        self
    }

    /// Set the maximum global gradient norm
    pub fn grad_eps(mut self, eps: f64) -> Self {
        self.grad_eps = eps;
        self
    }

    /// Set the discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the GAE lambda
    pub fn lam(mut self, lam: f64) -> Self {
        self.lam = lam;
        self
    }

    /// Enable or disable advantage normalization
    pub fn normalize_advantage(mut self, normalize: bool) -> Self {
        self.normalize_advantage = normalize;
        self
    }

    /// Enable or disable held-out evaluation at report time
    pub fn eval(mut self, eval: bool) -> Self {
        self.eval = eval;
        self
    }

    /// Report every `interval` updates
    pub fn log_interval(mut self, interval: usize) -> Self {
        self.log_interval = Some(interval);
        self
    }

    /// Seed torch and minibatch shuffling
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.batch_size, 512);
        assert_eq!(config.adam_eps, 1e-5);
    }

    #[test]
    fn test_config_validation() {
        assert!(TrainConfig::new().adam_lr(-1.0).validate().is_err());
        assert!(TrainConfig::new().gamma(1.5).validate().is_err());
        assert!(TrainConfig::new().num_epochs(0).validate().is_err());
        assert!(TrainConfig::new().batch_size(0).validate().is_err());
        assert!(TrainConfig::new().num_steps(0).validate().is_err());
        assert!(TrainConfig::new().grad_eps(0.0).validate().is_err());
        assert!(TrainConfig::new().log_interval(0).validate().is_err());
        assert!(TrainConfig::new().total_steps(0).validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TrainConfig::new().num_steps(128).batch_size(64).lam(0.9).seed(7);

        assert_eq!(config.num_steps, 128);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.seed, Some(7));

        let store = config.store_config();
        assert_eq!(store.lam, 0.9);
        assert_eq!(store.gamma, 0.99);
        assert!(store.normalize_advantage);
    }

    #[test]
    fn test_partial_json() {
        let config: TrainConfig = serde_json::from_str(r#"{"num_steps": 16, "eval": true}"#).unwrap();
        assert_eq!(config.num_steps, 16);
        assert!(config.eval);
        assert_eq!(config.num_epochs, 3);
    }
}
