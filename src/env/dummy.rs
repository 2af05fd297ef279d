//! Deterministic constant-reward environment
//!
//! Pays the same reward every step and ends the episode after a fixed number
//! of steps. The observation is the episode progress `steps / episode_len`
//! broadcast to the configured shape. Useful for checking bookkeeping in the
//! training loop, where every quantity can be computed by hand.

use anyhow::Result;

use super::{Environment, Frame, RenderMode, SpaceInfo, SpaceType, StepInfo, StepResult};

/// Constant-reward, fixed-length environment
#[derive(Debug, Clone)]
pub struct ConstantEnv {
    reward: f32,
    episode_len: usize,
    obs_shape: Vec<usize>,
    num_actions: usize,
    steps: usize,
}

impl ConstantEnv {
    /// Create an environment paying `reward` per step, `episode_len` steps long
    pub fn new(reward: f32, episode_len: usize) -> Self {
        assert!(episode_len > 0, "episode_len must be positive");
        Self { reward, episode_len, obs_shape: vec![1], num_actions: 2, steps: 0 }
    }

    /// Override the observation shape
    pub fn with_obs_shape(mut self, shape: Vec<usize>) -> Self {
        self.obs_shape = shape;
        self
    }

    /// Override the number of discrete actions
    pub fn with_num_actions(mut self, n: usize) -> Self {
        self.num_actions = n;
        self
    }

    /// Steps taken in the current episode
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn observation(&self) -> Vec<f32> {
        let progress = self.steps as f32 / self.episode_len as f32;
        vec![progress; self.obs_shape.iter().product()]
    }
}

impl Environment for ConstantEnv {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(&mut self, _action: i64) -> Result<StepResult> {
        self.steps += 1;
        let done = self.steps >= self.episode_len;
        Ok(StepResult {
            observation: self.observation(),
            reward: self.reward,
            done,
            info: StepInfo::default(),
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: self.obs_shape.clone(), dtype: SpaceType::Continuous }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(self.num_actions) }
    }

    fn render(&self, _mode: RenderMode) -> Result<Frame> {
        let shade = (255 * self.steps / self.episode_len) as u8;
        Ok(Frame::solid(8, 8, [shade, shade, shade]))
    }
}
