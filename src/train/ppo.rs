//! Proximal Policy Optimization (PPO) training loop
//!
//! # Algorithm Overview
//!
//! ```text
//! Until the step budget is spent:
//!   1. Collect num_steps transitions per instance with the current policy
//!   2. Record rewards (and an evaluation run) when a report is due
//!   3. Compute returns and advantages with GAE
//!   4. For num_epochs epochs:
//!      a. Draw shuffled minibatches from the trajectory store
//!      b. Compute the PPO loss (clipped objective)
//!      c. Backpropagate, clip the global gradient norm, step Adam
//! ```
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [High-Dimensional Continuous Control Using GAE](https://arxiv.org/abs/1506.02438)

pub mod collector;
pub mod config;
pub mod evaluate;
pub mod loss;
pub mod stats;
pub mod trainer;
pub mod update;

pub use collector::collect_rollout;
pub use config::TrainConfig;
pub use evaluate::{Evaluation, evaluate_policy};
pub use loss::{LossOutput, PpoLossConfig, compute_entropy_loss, compute_policy_loss, compute_value_loss, ppo_loss};
pub use stats::TrainingStats;
pub use trainer::{PpoTrainer, ReportSchedule, TrainingHistory};
pub use update::UpdateEngine;
