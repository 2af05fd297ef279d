//! Trajectory store for on-policy rollouts
//!
//! - [`storage`]: fixed-capacity, step-major arena with an explicit write cursor
//! - [`gae`]: residuals, advantages and returns via GAE
//! - [`sampling`]: shuffled minibatch generators over the completed window
//!
//! # Layout
//!
//! Every per-transition quantity is a flat array of `num_steps * num_envs`
//! cells, addressed as `step * num_envs + env`. Observations and values carry
//! one extra row for the bootstrap recorded by `store_last`.
//!
//! # Example
//!
//! ```rust
//! use rollout_rl::buffer::rollout::{StoreConfig, TrajectoryStore};
//! use rollout_rl::env::StepInfo;
//!
//! let config = StoreConfig { normalize_advantage: false, ..Default::default() };
//! let mut store = TrajectoryStore::new(&[1], 1, 2, config);
//! let infos = vec![StepInfo::default(); 2];
//!
//! store.store(&[0.0, 0.0], &[0, 1], &[1.0, 1.0], &[true, true], &infos, &[-0.7, -0.7], &[0.0, 0.0]);
//! store.store_last(&[0.0, 0.0], &[0.0, 0.0]);
//! store.compute_return_advantage();
//!
//! assert_eq!(store.advantages(), &[1.0, 1.0]);
//! assert_eq!(store.get_generator(1).count(), 2);
//! ```

pub mod gae;
pub mod sampling;
pub mod storage;


pub use sampling::{Minibatch, MinibatchGenerator, TensorBatch};
pub use storage::{StoreConfig, TrajectoryStore, Transition};
