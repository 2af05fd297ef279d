//! Reward normalization wrapper
//!
//! Divides rewards by the running standard deviation of the discounted
//! return, keeping the untouched reward in [`StepInfo::raw_reward`] so
//! reporting can still use the true scale.

use anyhow::Result;

use super::{Frame, RenderMode, SpaceInfo, VecEnv, VecStep};
use crate::utils::normalize::RunningMeanStd;

/// Scales rewards of an inner [`VecEnv`] by the running return std
pub struct NormalizeReward<V> {
    inner: V,
    gamma: f64,
    epsilon: f64,
    clip: f32,
    returns: Vec<f64>,
    return_rms: RunningMeanStd,
}

impl<V: VecEnv> NormalizeReward<V> {
    /// Wrap `inner`, discounting returns with `gamma`
    pub fn new(inner: V, gamma: f64) -> Self {
        let num_envs = inner.num_envs();
        Self {
            inner,
            gamma,
            epsilon: 1e-8,
            clip: 10.0,
            returns: vec![0.0; num_envs],
            return_rms: RunningMeanStd::new(),
        }
    }

    /// Clip normalized rewards to `[-clip, clip]`
    pub fn with_clip(mut self, clip: f32) -> Self {
        self.clip = clip;
        self
    }

    /// Access the wrapped environment
    pub fn inner(&self) -> &V {
        &self.inner
    }

    /// Running statistics of the discounted return
    pub fn return_stats(&self) -> &RunningMeanStd {
        &self.return_rms
    }
}

impl<V: VecEnv> VecEnv for NormalizeReward<V> {
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    fn observation_space(&self) -> SpaceInfo {
        self.inner.observation_space()
    }

    fn action_space(&self) -> SpaceInfo {
        self.inner.action_space()
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.returns.iter_mut().for_each(|r| *r = 0.0);
        self.inner.reset()
    }

    fn step(&mut self, actions: &[i64]) -> Result<VecStep> {
        let mut step = self.inner.step(actions)?;

        for (ret, &reward) in self.returns.iter_mut().zip(&step.rewards) {
            *ret = *ret * self.gamma + reward as f64;
        }
        let returns: Vec<f32> = self.returns.iter().map(|&r| r as f32).collect();
        self.return_rms.update(&returns);

        let std = self.return_rms.std(self.epsilon) as f32;
        for (i, reward) in step.rewards.iter_mut().enumerate() {
            if step.infos[i].raw_reward.is_none() {
                step.infos[i].raw_reward = Some(*reward);
            }
            *reward = (*reward / std).clamp(-self.clip, self.clip);
            if step.dones[i] {
                self.returns[i] = 0.0;
            }
        }
        Ok(step)
    }

    fn render(&mut self, mode: RenderMode) -> Result<Frame> {
        self.inner.render(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{dummy::ConstantEnv, pool::EnvPool};

    #[test]
    fn test_raw_reward_preserved() {
        let pool = EnvPool::new(|_| ConstantEnv::new(3.0, 5), 2);
        let mut env = NormalizeReward::new(pool, 0.99);
        env.reset().unwrap();

        for _ in 0..10 {
            let step = env.step(&[0, 0]).unwrap();
            for info in &step.infos {
                assert_eq!(info.raw_reward, Some(3.0));
            }
        }
    }

    #[test]
    fn test_rewards_are_rescaled() {
        let pool = EnvPool::new(|_| ConstantEnv::new(100.0, 50), 2);
        let mut env = NormalizeReward::new(pool, 0.99);
        env.reset().unwrap();

        let mut last = 0.0;
        for _ in 0..30 {
            last = env.step(&[0, 0]).unwrap().rewards[0];
        }
        assert!(last < 100.0);
        assert!(last > 0.0);
    }

    #[test]
    fn test_episode_stats_use_raw_reward() {
        let pool = EnvPool::new(|_| ConstantEnv::new(2.0, 3), 1);
        let mut env = NormalizeReward::new(pool, 0.99);
        env.reset().unwrap();

        let mut finished = None;
        for _ in 0..3 {
            let step = env.step(&[0]).unwrap();
            finished = finished.or(step.infos[0].episode);
        }
        assert_eq!(finished.unwrap().total_reward, 6.0);
    }
}
