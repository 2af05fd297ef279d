//! PPO trainer: the outer collect/update loop
//!
//! Owns the policy and its Adam optimizer for the whole run. Each iteration
//! collects one rollout, optionally records rewards (and a held-out
//! evaluation), computes returns and advantages, and runs the update engine.

use anyhow::{Result, bail};
use rand::{SeedableRng, rngs::StdRng};
use tch::nn::{self, OptimizerConfig};

use super::collector::collect_rollout;
use super::config::TrainConfig;
use super::evaluate::evaluate_policy;
use super::stats::TrainingStats;
use super::update::UpdateEngine;
use crate::buffer::rollout::TrajectoryStore;
use crate::env::VecEnv;
use crate::policy::ActorCritic;

/// When to record rewards, in units of completed updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSchedule {
    every: usize,
}

impl ReportSchedule {
    /// Roughly 100 reports over the whole run
    pub fn automatic(total_steps: usize, num_envs: usize, num_steps: usize) -> Self {
        Self { every: total_steps / (num_envs * num_steps * 100) + 1 }
    }

    /// Report every `updates` updates
    pub fn every(updates: usize) -> Self {
        assert!(updates > 0, "report interval must be positive");
        Self { every: updates }
    }

    /// `log_interval` if set, the automatic cadence otherwise
    pub fn from_config(config: &TrainConfig, num_envs: usize) -> Self {
        match config.log_interval {
            Some(n) => Self::every(n),
            None => Self::automatic(config.total_steps, num_envs, config.num_steps),
        }
    }

    /// Updates between reports
    pub fn interval(&self) -> usize {
        self.every
    }

    /// Whether a report is due before update number `n_updates`
    pub fn should_report(&self, n_updates: usize) -> bool {
        n_updates % self.every == 0
    }
}

/// Rewards recorded at each report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    /// Environment steps completed before the report
    pub steps: Vec<usize>,

    /// Mean summed training reward of the reported rollout
    pub train_rewards: Vec<f32>,

    /// Mean summed evaluation reward, when evaluation is enabled
    pub test_rewards: Option<Vec<f32>>,
}

impl TrainingHistory {
    fn new(with_test: bool) -> Self {
        Self { steps: Vec::new(), train_rewards: Vec::new(), test_rewards: with_test.then(Vec::new) }
    }

    fn record(&mut self, step: usize, train_reward: f32, test_reward: Option<f32>) {
        self.steps.push(step);
        self.train_rewards.push(train_reward);
        if let (Some(tests), Some(reward)) = (self.test_rewards.as_mut(), test_reward) {
            tests.push(reward);
        }
    }

    /// Number of recorded reports
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// PPO trainer over any [`ActorCritic`] model
pub struct PpoTrainer<P> {
    config: TrainConfig,
    policy: P,
    optimizer: nn::Optimizer,
    engine: UpdateEngine,
    n_updates: usize,
    last_stats: Option<TrainingStats>,
}

impl<P: ActorCritic> PpoTrainer<P> {
    /// Validate `config` and build Adam over the policy's parameters
    pub fn new(config: TrainConfig, policy: P) -> Result<Self> {
        config.validate()?;

        let adam = nn::Adam { eps: config.adam_eps, ..Default::default() };
        let optimizer = adam.build(policy.var_store(), config.adam_lr)?;
        let engine = UpdateEngine::new(config.num_epochs, config.batch_size, config.grad_eps);

        Ok(Self { config, policy, optimizer, engine, n_updates: 0, last_stats: None })
    }

    /// The policy being trained
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Consume the trainer, returning the policy
    pub fn into_policy(self) -> P {
        self.policy
    }

    /// Training configuration
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Number of policy updates completed by the latest `train` call
    pub fn n_updates(&self) -> usize {
        self.n_updates
    }

    /// Averaged statistics of the most recent update
    pub fn last_stats(&self) -> Option<&TrainingStats> {
        self.last_stats.as_ref()
    }

    /// Train until `total_steps` environment steps have been collected
    ///
    /// `eval_env` is required when `config.eval` is set; it is reset once and
    /// then continued from report to report. The update counter restarts at
    /// zero, so repeated calls follow the same report cadence.
    pub fn train<E>(&mut self, env: &mut E, mut eval_env: Option<&mut dyn VecEnv>) -> Result<TrainingHistory>
    where
        E: VecEnv + ?Sized,
    {
        let config = self.config.clone();
        if config.eval && eval_env.is_none() {
            bail!("evaluation is enabled but no evaluation environment was given");
        }

        let mut rng = match config.seed {
            Some(seed) => {
                tch::manual_seed(seed as i64);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };

        let num_envs = env.num_envs();
        let obs_shape = env.observation_space().shape;
        let mut store = TrajectoryStore::new(&obs_shape, config.num_steps, num_envs, config.store_config());
        let schedule = ReportSchedule::from_config(&config, num_envs);
        let mut history = TrainingHistory::new(config.eval);

        tracing::info!(
            num_envs,
            num_steps = config.num_steps,
            total_steps = config.total_steps,
            report_every = schedule.interval(),
            "starting training"
        );

        let mut obs = env.reset()?;
        let mut eval_obs = match eval_env.as_mut() {
            Some(eval) if config.eval => Some(eval.reset()?),
            _ => None,
        };

        self.n_updates = 0;
        let mut step = 0usize;
        while step < config.total_steps {
            obs = collect_rollout(&self.policy, env, &mut store, obs)?;

            if schedule.should_report(self.n_updates) {
                let train_reward = store.get_raw_reward();
                let test_reward = match (eval_env.as_mut(), eval_obs.take()) {
                    (Some(eval), Some(start)) => {
                        let result = evaluate_policy(&self.policy, &mut **eval, start, config.num_steps, false)?;
                        eval_obs = Some(result.last_obs.clone());
                        Some(result.mean_reward())
                    }
                    _ => None,
                };

                match test_reward {
                    Some(test) => tracing::info!(step, train_reward, test_reward = test, "report"),
                    None => tracing::info!(step, train_reward, "report"),
                }
                history.record(step, train_reward, test_reward);
            }

            step += num_envs * config.num_steps;

            store.compute_return_advantage();
            let stats = self.engine.run(&self.policy, &mut self.optimizer, &store, &mut rng)?;
            tracing::debug!(
                update = self.n_updates,
                policy_loss = stats.policy_loss,
                value_loss = stats.value_loss,
                entropy = stats.entropy,
                approx_kl = stats.approx_kl,
                clip_fraction = stats.clip_fraction,
                grad_norm = stats.grad_norm,
                "update"
            );
            self.last_stats = Some(stats);
            self.n_updates += 1;
        }

        Ok(history)
    }
}
