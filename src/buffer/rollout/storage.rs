//! Trajectory store: the fixed-capacity rollout arena
//!
//! All per-transition data lives in flat, step-major arenas allocated once at
//! construction. The flattened index of `(step, env)` is
//! `step * num_envs + env`, which is also the index space minibatches are
//! drawn from.
//!
//! Lifecycle of one rollout:
//! 1. [`TrajectoryStore::reset`] moves the write cursor back to zero
//! 2. `num_steps` calls to [`TrajectoryStore::store`]
//! 3. one call to [`TrajectoryStore::store_last`] with the bootstrap pair
//! 4. [`TrajectoryStore::compute_return_advantage`]
//! 5. any number of [`TrajectoryStore::get_generator`] calls, one per epoch
//!
//! Calling these out of order is a programming error and panics.

use serde::{Deserialize, Serialize};

use super::gae;
use crate::env::StepInfo;

/// Discounting and post-processing settings for return/advantage computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Discount factor
    pub gamma: f64,

    /// GAE lambda parameter
    pub lam: f64,

    /// Standardize advantages over the whole window after computing returns
    pub normalize_advantage: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { gamma: 0.99, lam: 0.95, normalize_advantage: true }
    }
}

/// Borrowed view of one stored transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<'a> {
    /// Observation the action was chosen from
    pub observation: &'a [f32],

    /// Action taken
    pub action: i64,

    /// Reward received
    pub reward: f32,

    /// Whether the episode ended on this step
    pub done: bool,

    /// Environment info
    pub info: &'a StepInfo,

    /// Log probability of the action under the collecting policy
    pub log_prob: f32,

    /// Value estimate of the observation
    pub value: f32,
}

/// Rollout storage for one window of `num_steps` across `num_envs` instances
#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    num_steps: usize,
    num_envs: usize,
    obs_shape: Vec<usize>,
    obs_len: usize,
    config: StoreConfig,

    /// `[num_steps + 1, num_envs, obs_len]`, the last row is the bootstrap
    observations: Vec<f32>,

    /// `[num_steps, num_envs]`
    actions: Vec<i64>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    infos: Vec<StepInfo>,
    log_probs: Vec<f32>,

    /// `[num_steps + 1, num_envs]`, the last row is the bootstrap
    values: Vec<f32>,

    /// `[num_steps, num_envs]`, filled by `compute_return_advantage`
    deltas: Vec<f32>,
    advantages: Vec<f32>,
    returns: Vec<f32>,

    cursor: usize,
    bootstrapped: bool,
    computed: bool,
}

impl TrajectoryStore {
    /// Allocate a store for `num_steps` steps of `num_envs` instances
    pub fn new(obs_shape: &[usize], num_steps: usize, num_envs: usize, config: StoreConfig) -> Self {
        assert!(num_steps > 0, "num_steps must be positive");
        assert!(num_envs > 0, "num_envs must be positive");

        let obs_len: usize = obs_shape.iter().product();
        let cells = num_steps * num_envs;

        Self {
            num_steps,
            num_envs,
            obs_shape: obs_shape.to_vec(),
            obs_len,
            config,
            observations: vec![0.0; (num_steps + 1) * num_envs * obs_len],
            actions: vec![0; cells],
            rewards: vec![0.0; cells],
            dones: vec![false; cells],
            infos: vec![StepInfo::default(); cells],
            log_probs: vec![0.0; cells],
            values: vec![0.0; (num_steps + 1) * num_envs],
            deltas: vec![0.0; cells],
            advantages: vec![0.0; cells],
            returns: vec![0.0; cells],
            cursor: 0,
            bootstrapped: false,
            computed: false,
        }
    }

    /// Start a new rollout: rewind the write cursor
    ///
    /// Old contents stay in place and are overwritten by the next `store` calls.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.bootstrapped = false;
        self.computed = false;
    }

    /// Write one time step for every instance at the cursor
    ///
    /// # Panics
    ///
    /// Panics when the window is already full, or when any slice does not
    /// cover exactly `num_envs` instances.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &mut self,
        observations: &[f32],
        actions: &[i64],
        rewards: &[f32],
        dones: &[bool],
        infos: &[StepInfo],
        log_probs: &[f32],
        values: &[f32],
    ) {
        assert!(
            self.cursor < self.num_steps,
            "trajectory store is full: store called more than num_steps ({}) times since reset",
            self.num_steps
        );
        let n = self.num_envs;
        assert_eq!(observations.len(), n * self.obs_len, "observation batch size mismatch");
        assert_eq!(actions.len(), n, "actions length mismatch");
        assert_eq!(rewards.len(), n, "rewards length mismatch");
        assert_eq!(dones.len(), n, "dones length mismatch");
        assert_eq!(infos.len(), n, "infos length mismatch");
        assert_eq!(log_probs.len(), n, "log_probs length mismatch");
        assert_eq!(values.len(), n, "values length mismatch");

        let row = self.cursor * n;
        let obs_row = row * self.obs_len;
        self.observations[obs_row..obs_row + n * self.obs_len].copy_from_slice(observations);
        self.actions[row..row + n].copy_from_slice(actions);
        self.rewards[row..row + n].copy_from_slice(rewards);
        self.dones[row..row + n].copy_from_slice(dones);
        self.infos[row..row + n].clone_from_slice(infos);
        self.log_probs[row..row + n].copy_from_slice(log_probs);
        self.values[row..row + n].copy_from_slice(values);

        self.cursor += 1;
        self.computed = false;
    }

    /// Record the bootstrap observation and value after the final step
    ///
    /// # Panics
    ///
    /// Panics unless exactly `num_steps` steps have been stored since the
    /// last reset.
    pub fn store_last(&mut self, observations: &[f32], values: &[f32]) {
        assert_eq!(
            self.cursor, self.num_steps,
            "store_last requires a full window: {} of {} steps stored",
            self.cursor, self.num_steps
        );
        assert!(!self.bootstrapped, "store_last called twice for the same rollout");
        let n = self.num_envs;
        assert_eq!(observations.len(), n * self.obs_len, "observation batch size mismatch");
        assert_eq!(values.len(), n, "values length mismatch");

        let obs_row = self.num_steps * n * self.obs_len;
        self.observations[obs_row..].copy_from_slice(observations);
        self.values[self.num_steps * n..].copy_from_slice(values);
        self.bootstrapped = true;
    }

    /// Compute residuals, advantages and returns for every cell
    ///
    /// Runs the backward GAE recursion seeded from the bootstrap values; see
    /// [`gae::compute_gae`]. Returns are `advantage + value` from the raw
    /// advantages; normalization (if enabled) only touches the advantages.
    ///
    /// # Panics
    ///
    /// Panics if [`TrajectoryStore::store_last`] has not been called.
    pub fn compute_return_advantage(&mut self) {
        assert!(
            self.bootstrapped,
            "compute_return_advantage called before store_last recorded the bootstrap value"
        );

        gae::compute_gae(
            &self.rewards,
            &self.values,
            &self.dones,
            self.num_envs,
            self.config.gamma as f32,
            self.config.lam as f32,
            gae::GaeOutput {
                deltas: &mut self.deltas,
                advantages: &mut self.advantages,
                returns: &mut self.returns,
            },
        );

        if self.config.normalize_advantage {
            gae::normalize_advantages(&mut self.advantages);
        }
        self.computed = true;
    }

    /// Mean over instances of the per-instance reward summed over the window
    pub fn get_reward(&self) -> f32 {
        self.mean_summed(|i| self.rewards[i])
    }

    /// Like [`TrajectoryStore::get_reward`], but uses the un-normalized reward
    /// from `info` where a wrapper recorded one
    pub fn get_raw_reward(&self) -> f32 {
        self.mean_summed(|i| self.infos[i].raw_reward.unwrap_or(self.rewards[i]))
    }

    fn mean_summed(&self, reward: impl Fn(usize) -> f32) -> f32 {
        let mut per_env = vec![0.0f32; self.num_envs];
        for step in 0..self.cursor {
            for (env, total) in per_env.iter_mut().enumerate() {
                *total += reward(step * self.num_envs + env);
            }
        }
        per_env.iter().sum::<f32>() / self.num_envs as f32
    }

    /// View of the transition at `(step, env)`
    pub fn transition(&self, step: usize, env: usize) -> Transition<'_> {
        assert!(step < self.num_steps, "step {} >= num_steps {}", step, self.num_steps);
        assert!(env < self.num_envs, "env {} >= num_envs {}", env, self.num_envs);
        let i = step * self.num_envs + env;
        Transition {
            observation: self.observation(i),
            action: self.actions[i],
            reward: self.rewards[i],
            done: self.dones[i],
            info: &self.infos[i],
            log_prob: self.log_probs[i],
            value: self.values[i],
        }
    }

    /// Observation at flattened index `i` (the bootstrap row included)
    pub fn observation(&self, i: usize) -> &[f32] {
        &self.observations[i * self.obs_len..(i + 1) * self.obs_len]
    }

    /// Bootstrap values `[num_envs]`
    pub fn bootstrap_values(&self) -> &[f32] {
        &self.values[self.num_steps * self.num_envs..]
    }

    /// Bootstrap observations `[num_envs * obs_len]`
    pub fn bootstrap_observations(&self) -> &[f32] {
        &self.observations[self.num_steps * self.num_envs * self.obs_len..]
    }

    /// Buffer shape (num_steps, num_envs, obs_len)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_steps, self.num_envs, self.obs_len)
    }

    /// Per-instance observation shape
    pub fn obs_shape(&self) -> &[usize] {
        &self.obs_shape
    }

    /// Capacity in transitions, `num_steps * num_envs`
    pub fn len(&self) -> usize {
        self.num_steps * self.num_envs
    }

    /// Check if the store has zero capacity (never true after `new`)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Steps written since the last reset
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the store holds a complete, annotated rollout
    pub fn is_ready(&self) -> bool {
        self.computed
    }

    /// Return/advantage settings
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Actions taken, `[num_steps * num_envs]`
    pub fn actions(&self) -> &[i64] {
        &self.actions
    }

    /// Rewards received, `[num_steps * num_envs]`
    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    /// Episode-end flags, `[num_steps * num_envs]`
    pub fn dones(&self) -> &[bool] {
        &self.dones
    }

    /// Log probabilities under the collecting policy, `[num_steps * num_envs]`
    pub fn log_probs(&self) -> &[f32] {
        &self.log_probs
    }

    /// Value estimates, bootstrap row excluded, `[num_steps * num_envs]`
    pub fn values(&self) -> &[f32] {
        &self.values[..self.len()]
    }

    /// TD residuals, `[num_steps * num_envs]`
    pub fn deltas(&self) -> &[f32] {
        &self.deltas
    }

    /// Advantage estimates, `[num_steps * num_envs]`
    pub fn advantages(&self) -> &[f32] {
        &self.advantages
    }

    /// Return targets, `[num_steps * num_envs]`
    pub fn returns(&self) -> &[f32] {
        &self.returns
    }
}
