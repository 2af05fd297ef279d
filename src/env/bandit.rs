//! Contextual bandit environment
//!
//! - State: single binary value (0 or 1)
//! - Actions: two choices (0 or 1)
//! - Reward: +1.0 if action == state, 0.0 otherwise
//! - Episodes: fixed length
//!
//! Each instance is seeded from a level index, so a factory can hand out
//! disjoint level ranges to training and evaluation pools the same way a
//! procedurally generated benchmark separates train and test levels.
//! PPO should converge to reward 1.0 on every step here.

use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{Environment, Frame, RenderMode, SpaceInfo, SpaceType, StepInfo, StepResult};

/// Binary contextual bandit
#[derive(Debug)]
pub struct ContextBandit {
    level: u64,
    state: f32,
    steps: usize,
    max_steps: usize,
    rng: StdRng,
}

impl ContextBandit {
    /// Create a bandit whose context sequence is determined by `level`
    pub fn new(level: u64) -> Self {
        Self { level, state: 0.0, steps: 0, max_steps: 100, rng: StdRng::seed_from_u64(level) }
    }

    /// Pick a level from `[start_level, start_level + num_levels)`, or any
    /// level when `num_levels == 0`
    pub fn from_level_range(start_level: u64, num_levels: u64, rng: &mut impl Rng) -> Self {
        let level = if num_levels == 0 {
            rng.r#gen::<u64>()
        } else {
            start_level + rng.gen_range(0..num_levels)
        };
        Self::new(level)
    }

    /// Set the episode length
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Level this instance was seeded from
    pub fn level(&self) -> u64 {
        self.level
    }

    /// Current context
    pub fn state(&self) -> i64 {
        self.state as i64
    }
}

impl Environment for ContextBandit {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.state = self.rng.gen_range(0..2) as f32;
        self.steps = 0;
        Ok(vec![self.state])
    }

    fn step(&mut self, action: i64) -> Result<StepResult> {
        let reward = if action == self.state as i64 { 1.0 } else { 0.0 };

        self.steps += 1;
        let done = self.steps >= self.max_steps;

        self.state = self.rng.gen_range(0..2) as f32;

        Ok(StepResult { observation: vec![self.state], reward, done, info: StepInfo::default() })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![1], dtype: SpaceType::Continuous }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(2) }
    }

    fn render(&self, _mode: RenderMode) -> Result<Frame> {
        let colour = if self.state > 0.5 { [255, 255, 255] } else { [0, 0, 0] };
        Ok(Frame::solid(16, 16, colour))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandit_rewards() {
        let mut env = ContextBandit::new(7);
        env.reset().unwrap();

        let state = env.state();
        assert_eq!(env.step(state).unwrap().reward, 1.0);

        let state = env.state();
        assert_eq!(env.step(1 - state).unwrap().reward, 0.0);
    }

    #[test]
    fn test_episode_length() {
        let mut env = ContextBandit::new(0).with_max_steps(10);
        env.reset().unwrap();

        for i in 0..9 {
            assert!(!env.step(0).unwrap().done, "Episode terminated early at step {}", i);
        }
        assert!(env.step(0).unwrap().done, "Episode should terminate at step 10");
    }

    #[test]
    fn test_same_level_same_contexts() {
        let mut a = ContextBandit::new(42);
        let mut b = ContextBandit::new(42);
        assert_eq!(a.reset().unwrap(), b.reset().unwrap());
        for _ in 0..20 {
            assert_eq!(a.step(0).unwrap().observation, b.step(0).unwrap().observation);
        }
    }

    #[test]
    fn test_level_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            let env = ContextBandit::from_level_range(100, 5, &mut rng);
            assert!((100..105).contains(&env.level()));
        }
    }
}
