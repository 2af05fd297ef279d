//! Vectorized environment pool for parallel execution
//!
//! Lifts any single-instance [`Environment`] into a [`VecEnv`]. Instances are
//! stepped in parallel with Rayon, finished instances are reset in place, and
//! running episode statistics are reported in [`StepInfo::episode`].
//!
//! # Example
//!
//! ```rust
//! use rollout_rl::env::{VecEnv, dummy::ConstantEnv, pool::EnvPool};
//!
//! let mut pool = EnvPool::new(|_| ConstantEnv::new(1.0, 10), 4);
//! let observations = pool.reset().unwrap();
//! assert_eq!(observations.len(), 4);
//!
//! let step = pool.step(&[0, 1, 0, 1]).unwrap();
//! assert_eq!(step.rewards, vec![1.0; 4]);
//! ```

use anyhow::{Result, ensure};
use rayon::prelude::*;

use crate::env::{EpisodeStats, Environment, Frame, RenderMode, SpaceInfo, StepResult, VecEnv, VecStep};

/// One environment plus its running episode counters
#[derive(Debug)]
struct Slot<E> {
    env: E,
    episode_reward: f32,
    episode_length: usize,
}

impl<E: Environment> Slot<E> {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.episode_reward = 0.0;
        self.episode_length = 0;
        self.env.reset()
    }

    fn step(&mut self, action: i64) -> Result<StepResult> {
        let mut result = self.env.step(action)?;
        self.episode_reward += result.info.raw_reward.unwrap_or(result.reward);
        self.episode_length += 1;

        if result.done {
            result.info.episode = Some(EpisodeStats {
                total_reward: self.episode_reward,
                length: self.episode_length,
            });
            result.observation = self.reset()?;
        }
        Ok(result)
    }
}

/// A pool of environments stepped in lock-step
///
/// For N environments with average step time T:
/// - Sequential: O(N * T)
/// - Parallel: O(max(T)) ≈ O(T) when N ≤ num_cores
pub struct EnvPool<E: Environment> {
    slots: Vec<Slot<E>>,
    obs_space: SpaceInfo,
    action_space: SpaceInfo,
}

impl<E: Environment + Send> EnvPool<E> {
    /// Create a new environment pool
    ///
    /// `env_fn` receives the instance index, which lets factories derive
    /// per-instance seeds.
    pub fn new<F>(env_fn: F, num_envs: usize) -> Self
    where
        F: Fn(usize) -> E,
    {
        assert!(num_envs > 0, "EnvPool needs at least one environment");
        let slots: Vec<Slot<E>> = (0..num_envs)
            .map(|i| Slot { env: env_fn(i), episode_reward: 0.0, episode_length: 0 })
            .collect();
        let obs_space = slots[0].env.observation_space();
        let action_space = slots[0].env.action_space();
        Self { slots, obs_space, action_space }
    }

    /// Access one instance
    pub fn get(&self, env_id: usize) -> &E {
        &self.slots[env_id].env
    }
}

impl<E: Environment + Send> VecEnv for EnvPool<E> {
    fn num_envs(&self) -> usize {
        self.slots.len()
    }

    fn observation_space(&self) -> SpaceInfo {
        self.obs_space.clone()
    }

    fn action_space(&self) -> SpaceInfo {
        self.action_space.clone()
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        let observations = self
            .slots
            .par_iter_mut()
            .map(|slot| slot.reset())
            .collect::<Result<Vec<_>>>()?;
        Ok(observations.concat())
    }

    fn step(&mut self, actions: &[i64]) -> Result<VecStep> {
        assert_eq!(
            actions.len(),
            self.slots.len(),
            "Number of actions must match number of environments"
        );

        let results = self
            .slots
            .par_iter_mut()
            .zip(actions.par_iter())
            .map(|(slot, &action)| slot.step(action))
            .collect::<Result<Vec<_>>>()?;

        let obs_len = self.obs_space.flat_dim();
        let mut step = VecStep {
            observations: Vec::with_capacity(results.len() * obs_len),
            rewards: Vec::with_capacity(results.len()),
            dones: Vec::with_capacity(results.len()),
            infos: Vec::with_capacity(results.len()),
        };
        for result in results {
            ensure!(
                result.observation.len() == obs_len,
                "observation has {} elements, expected {}",
                result.observation.len(),
                obs_len
            );
            step.observations.extend_from_slice(&result.observation);
            step.rewards.push(result.reward);
            step.dones.push(result.done);
            step.infos.push(result.info);
        }
        Ok(step)
    }

    /// Renders the first instance
    fn render(&mut self, mode: RenderMode) -> Result<Frame> {
        self.slots[0].env.render(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::dummy::ConstantEnv;

    #[test]
    fn test_pool_creation() {
        let pool = EnvPool::new(|_| ConstantEnv::new(1.0, 5), 4);
        assert_eq!(pool.num_envs(), 4);
        assert_eq!(pool.observation_space().shape, vec![1]);
    }

    #[test]
    fn test_pool_reset_stacks_observations() {
        let mut pool = EnvPool::new(|_| ConstantEnv::new(1.0, 5).with_obs_shape(vec![2, 3]), 3);
        let observations = pool.reset().unwrap();
        assert_eq!(observations.len(), 3 * 6);
    }

    #[test]
    fn test_pool_auto_reset_reports_episode() {
        let mut pool = EnvPool::new(|_| ConstantEnv::new(2.0, 3), 2);
        pool.reset().unwrap();

        for _ in 0..2 {
            let step = pool.step(&[0, 0]).unwrap();
            assert_eq!(step.dones, vec![false, false]);
            assert!(step.infos.iter().all(|info| info.episode.is_none()));
        }

        let step = pool.step(&[0, 0]).unwrap();
        assert_eq!(step.dones, vec![true, true]);
        let episode = step.infos[0].episode.unwrap();
        assert_eq!(episode.length, 3);
        assert_eq!(episode.total_reward, 6.0);

        // Next episode starts from scratch
        let step = pool.step(&[0, 0]).unwrap();
        assert_eq!(step.dones, vec![false, false]);
        assert_eq!(pool.get(0).steps(), 1);
    }

    #[test]
    #[should_panic(expected = "Number of actions must match number of environments")]
    fn test_pool_step_wrong_action_count() {
        let mut pool = EnvPool::new(|_| ConstantEnv::new(1.0, 5), 4);
        pool.reset().unwrap();
        let _ = pool.step(&[0, 1]);
    }

    #[test]
    fn test_pool_render() {
        let mut pool = EnvPool::new(|_| ConstantEnv::new(1.0, 5), 2);
        pool.reset().unwrap();
        let frame = pool.render(RenderMode::RgbArray).unwrap();
        assert_eq!(frame.data.len(), frame.height * frame.width * 3);
    }
}
