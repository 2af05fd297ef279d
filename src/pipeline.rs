//! End-to-end training pipeline
//!
//! Builds the training and held-out evaluation environments, trains an
//! [`MlpPolicy`], then writes the reward history, a model snapshot and a
//! frame sequence of the trained policy under `base_dir`:
//!
//! ```text
//! base_dir/
//!   results/rewards/{model}_{env}.csv
//!   results/videos/{model}_{env}/frame_00000.png ...
//!   models/{model}_{env}.ot
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tch::Device;

use crate::env::{VecEnv, bandit::ContextBandit, normalize::NormalizeReward, pool::EnvPool};
use crate::persist;
use crate::policy::mlp::{MlpConfig, MlpPolicy};
use crate::train::ppo::{PpoLossConfig, PpoTrainer, TrainConfig, TrainingHistory, evaluate_policy};

/// Full description of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Environment name handed to the factory
    pub env_name: String,

    /// Base model name
    pub model_name: String,

    /// Run identifier appended to the model name
    pub model_id: usize,

    /// Marks a throwaway run; artifacts get a `test_` prefix instead of the id
    pub test_run: bool,

    /// Parallel instances for training and evaluation
    pub num_envs: usize,

    /// Number of training levels, starting at level 0
    pub num_levels: u64,

    /// Steps recorded for the final video
    pub video_steps: usize,

    /// Force CPU even when CUDA is available
    pub cpu: bool,

    /// Outer-loop hyperparameters
    pub train: TrainConfig,

    /// Actor-critic network shape
    pub model: MlpConfig,

    /// PPO criterion settings
    pub loss: PpoLossConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            env_name: "bandit".to_string(),
            model_name: "mlp".to_string(),
            model_id: 0,
            test_run: false,
            num_envs: 32,
            num_levels: 200,
            video_steps: 1024,
            cpu: false,
            train: TrainConfig::default(),
            model: MlpConfig::default(),
            loss: PpoLossConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Validate this config and every nested one
    pub fn validate(&self) -> Result<()> {
        if self.num_envs == 0 {
            bail!("num_envs must be positive");
        }
        if self.env_name.is_empty() {
            bail!("env_name must not be empty");
        }
        self.train.validate()?;
        self.model.validate()?;
        self.loss.validate()?;
        Ok(())
    }

    /// `test_{model_name}` for test runs, `{model_name}_id{model_id}` otherwise
    pub fn run_name(&self) -> String {
        if self.test_run {
            format!("test_{}", self.model_name)
        } else {
            format!("{}_id{}", self.model_name, self.model_id)
        }
    }

    /// Artifact stem shared by every output, `{run_name}_{env_name}`
    pub fn artifact_stem(&self) -> String {
        format!("{}_{}", self.run_name(), self.env_name)
    }
}

/// Level range and wrappers for one environment instance batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvSpec {
    /// Parallel instances
    pub num_envs: usize,

    /// First level of the range
    pub start_level: u64,

    /// Size of the level range, 0 for the full distribution
    pub num_levels: u64,

    /// Wrap the batch in [`NormalizeReward`]
    pub normalize_reward: bool,
}

/// Builds vectorized environments by name
pub trait EnvFactory {
    /// Environment type produced by this factory
    type Env: VecEnv;

    /// Build `env_name` with the level range and wrappers in `spec`
    fn make(&self, env_name: &str, spec: &EnvSpec) -> Result<Self::Env>;
}

/// Factory for the bundled [`ContextBandit`]
#[derive(Debug, Clone, Default)]
pub struct BanditFactory {
    /// Seed for picking levels, entropy when unset
    pub seed: Option<u64>,

    /// Episode length
    pub max_steps: Option<usize>,
}

impl EnvFactory for BanditFactory {
    type Env = Box<dyn VecEnv>;

    fn make(&self, env_name: &str, spec: &EnvSpec) -> Result<Self::Env> {
        if env_name != "bandit" {
            bail!("unknown environment '{}'", env_name);
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ spec.start_level),
            None => StdRng::from_entropy(),
        };
        let levels: Vec<u64> = (0..spec.num_envs)
            .map(|_| ContextBandit::from_level_range(spec.start_level, spec.num_levels, &mut rng).level())
            .collect();
        let max_steps = self.max_steps;
        let pool = EnvPool::new(
            |i| {
                let env = ContextBandit::new(levels[i]);
                match max_steps {
                    Some(n) => env.with_max_steps(n),
                    None => env,
                }
            },
            spec.num_envs,
        );

        if spec.normalize_reward {
            Ok(Box::new(NormalizeReward::new(pool, 0.99)))
        } else {
            Ok(Box::new(pool))
        }
    }
}

/// Where the pipeline wrote its artifacts
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Reward history of the run
    pub history: TrainingHistory,

    /// Reward CSV
    pub rewards_path: PathBuf,

    /// Saved variable store
    pub model_path: PathBuf,

    /// Directory of the PNG frame sequence
    pub video_dir: PathBuf,

    /// Mean summed reward of the recorded episode
    pub video_return: f32,
}

/// Train, evaluate and persist one run described by `config`
pub fn training_pipeline<F: EnvFactory>(
    config: &PipelineConfig,
    factory: &F,
    base_dir: &Path,
) -> Result<PipelineOutput> {
    config.validate()?;
    let started = Instant::now();

    let device = if config.cpu { Device::Cpu } else { Device::cuda_if_available() };
    tracing::info!("running on {:?}", device);
    if let Some(seed) = config.train.seed {
        tch::manual_seed(seed as i64);
    }

    let mut env = factory.make(
        &config.env_name,
        &EnvSpec { num_envs: config.num_envs, start_level: 0, num_levels: config.num_levels, normalize_reward: false },
    )?;
    // Held-out levels: everything from num_levels on
    let held_out = |num_envs| EnvSpec {
        num_envs,
        start_level: config.num_levels,
        num_levels: 0,
        normalize_reward: false,
    };
    let mut eval_env = factory.make(&config.env_name, &held_out(config.num_envs))?;

    let obs_space = env.observation_space();
    let Some(num_actions) = env.action_space().num_actions() else {
        bail!("environment '{}' does not have a discrete action space", config.env_name);
    };
    let policy = MlpPolicy::on_device(&obs_space.shape, num_actions, config.model.clone(), device)?
        .with_loss(config.loss.clone());

    let stem = config.artifact_stem();
    tracing::info!(run = %stem, "training");
    let mut trainer = PpoTrainer::new(config.train.clone(), policy)?;
    let history = trainer.train(&mut env, Some(&mut eval_env as &mut dyn VecEnv))?;

    let rewards_path = base_dir.join("results").join("rewards").join(format!("{stem}.csv"));
    persist::save_rewards(&history, &rewards_path)?;

    let policy = trainer.into_policy();
    let model_path = base_dir.join("models").join(format!("{stem}.ot"));
    persist::save_model(&policy, &model_path)?;

    let mut video_env = factory.make(&config.env_name, &held_out(1))?;
    let obs = video_env.reset()?;
    let video = evaluate_policy(&policy, &mut video_env, obs, config.video_steps, true)?;
    let video_dir = base_dir.join("results").join("videos").join(&stem);
    persist::save_frames(&video.frames, &video_dir)?;

    let video_return = video.mean_reward();
    tracing::info!(
        video_return,
        minutes = started.elapsed().as_secs_f64() / 60.0,
        rewards = %rewards_path.display(),
        model = %model_path.display(),
        "pipeline finished"
    );

    Ok(PipelineOutput { history, rewards_path, model_path, video_dir, video_return })
}
