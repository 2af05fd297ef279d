//! # rollout-rl
//!
//! On-policy actor-critic (PPO) training over vectorized environments, with
//! neural networks via tch-rs.
//!
//! The loop alternates two phases until the step budget is spent:
//! a rollout collector fills a fixed-capacity [`buffer::rollout::TrajectoryStore`]
//! under the current policy, then the update engine runs several epochs of
//! shuffled minibatch PPO updates on it using GAE advantages.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rollout_rl::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut env = EnvPool::new(|i| ContextBandit::new(i as u64), 8);
//! let policy = MlpPolicy::new(&[1], 2, MlpConfig::default())?;
//! let config = TrainConfig::new().num_steps(64).batch_size(128).total_steps(20_000);
//!
//! let mut trainer = PpoTrainer::new(config, policy)?;
//! let history = trainer.train(&mut env, None)?;
//! println!("final reward: {:?}", history.train_rewards.last());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment traits and implementations
pub mod env;

/// Actor-critic models and action distributions
pub mod policy;

/// Trajectory storage, advantage estimation and minibatch sampling
pub mod buffer;

/// Training loop (PPO)
pub mod train;

/// Utility functions and helpers
pub mod utils;

/// Reward CSVs, model snapshots and frame sequences
pub mod persist;

/// End-to-end train/evaluate/persist pipeline
pub mod pipeline;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::buffer::rollout::{StoreConfig, TrajectoryStore};
    pub use crate::env::{
        Environment, VecEnv, bandit::ContextBandit, dummy::ConstantEnv, normalize::NormalizeReward,
        pool::EnvPool,
    };
    pub use crate::pipeline::{BanditFactory, EnvFactory, EnvSpec, PipelineConfig, training_pipeline};
    pub use crate::policy::{
        ActorCritic, Categorical, Mode,
        mlp::{Activation, MlpConfig, MlpPolicy},
    };
    pub use crate::train::ppo::{
        PpoLossConfig, PpoTrainer, TrainConfig, TrainingHistory, TrainingStats, evaluate_policy,
    };
}

/// Current version of rollout-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
