//! Environment traits and implementations
//!
//! Two levels of interface live here:
//! - [`Environment`]: a single simulator instance
//! - [`VecEnv`]: a batch of instances stepped in lock-step, which is what the
//!   training loop talks to
//!
//! [`pool::EnvPool`] lifts any [`Environment`] into a [`VecEnv`].

use anyhow::Result;

pub mod bandit;
pub mod dummy;
pub mod normalize;
pub mod pool;

/// Core trait for a single RL environment instance
pub trait Environment {
    /// Reset the environment and return the initial observation
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Step the environment with a discrete action
    fn step(&mut self, action: i64) -> Result<StepResult>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;

    /// Render the current state
    fn render(&self, mode: RenderMode) -> Result<Frame>;
}

/// Vectorized environment: every call covers all instances at once
///
/// Observations are returned stacked and flattened, `[num_envs * obs_len]`,
/// where `obs_len` is the product of `observation_space().shape`.
/// Instances that finish an episode are reset internally, so the observation
/// returned for a `done` instance is the first one of its next episode.
pub trait VecEnv {
    /// Number of parallel instances
    fn num_envs(&self) -> usize;

    /// Per-instance observation space
    fn observation_space(&self) -> SpaceInfo;

    /// Per-instance action space
    fn action_space(&self) -> SpaceInfo;

    /// Reset every instance
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Step every instance with one action each
    fn step(&mut self, actions: &[i64]) -> Result<VecStep>;

    /// Render a frame of the batch
    fn render(&mut self, mode: RenderMode) -> Result<Frame>;
}

impl<V: VecEnv + ?Sized> VecEnv for Box<V> {
    fn num_envs(&self) -> usize {
        (**self).num_envs()
    }

    fn observation_space(&self) -> SpaceInfo {
        (**self).observation_space()
    }

    fn action_space(&self) -> SpaceInfo {
        (**self).action_space()
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        (**self).reset()
    }

    fn step(&mut self, actions: &[i64]) -> Result<VecStep> {
        (**self).step(actions)
    }

    fn render(&mut self, mode: RenderMode) -> Result<Frame> {
        (**self).render(mode)
    }
}

/// Result of a single-instance environment step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation
    pub observation: Vec<f32>,

    /// Reward received
    pub reward: f32,

    /// Whether the episode ended on this step
    pub done: bool,

    /// Additional info
    pub info: StepInfo,
}

/// Result of a vectorized step
#[derive(Debug, Clone)]
pub struct VecStep {
    /// Stacked next observations `[num_envs * obs_len]`
    pub observations: Vec<f32>,

    /// Rewards `[num_envs]`
    pub rewards: Vec<f32>,

    /// Episode-end flags `[num_envs]`
    pub dones: Vec<bool>,

    /// Per-instance info `[num_envs]`
    pub infos: Vec<StepInfo>,
}

impl VecStep {
    /// Number of instances covered by this step
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if the step covers no instances
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Space information for observations and actions
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: SpaceType,
}

impl SpaceInfo {
    /// Number of scalar elements in one sample of this space
    pub fn flat_dim(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of discrete choices, if the space is discrete
    pub fn num_actions(&self) -> Option<usize> {
        match self.dtype {
            SpaceType::Discrete(n) => Some(n),
            SpaceType::Continuous => None,
        }
    }
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space (Box)
    Continuous,
}

/// Additional step information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Reward before any wrapper rescaled it
    pub raw_reward: Option<f32>,

    /// Set on the step an episode finishes
    pub episode: Option<EpisodeStats>,
}

/// Summary of a finished episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    /// Undiscounted sum of rewards
    pub total_reward: f32,

    /// Number of steps
    pub length: usize,
}

/// Render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum RenderMode {
    /// Return an RGB pixel buffer
    #[default]
    RgbArray,
}

/// An RGB frame, row-major `[height, width, 3]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Height in pixels
    pub height: usize,

    /// Width in pixels
    pub width: usize,

    /// Pixel data, `height * width * 3` bytes
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame filled with a single colour
    pub fn solid(height: usize, width: usize, rgb: [u8; 3]) -> Self {
        let data = rgb.iter().copied().cycle().take(height * width * 3).collect();
        Self { height, width, data }
    }

    /// Convert a float image in `[0, 1]` to bytes
    pub fn from_unit_floats(height: usize, width: usize, pixels: &[f32]) -> Self {
        assert_eq!(pixels.len(), height * width * 3, "frame size mismatch");
        let data = pixels.iter().map(|&p| (p.clamp(0.0, 1.0) * 255.0) as u8).collect();
        Self { height, width, data }
    }
}
