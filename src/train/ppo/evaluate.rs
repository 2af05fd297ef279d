//! Evaluation runner
//!
//! Plays the current policy without touching parameters or optimizer state.

use anyhow::Result;

use crate::env::{Frame, RenderMode, VecEnv};
use crate::policy::{ActorCritic, obs_to_tensor};

/// Outcome of an evaluation run
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Reward summed over the run, per instance
    pub total_reward: Vec<f32>,

    /// Observation after the last step, to resume from later
    pub last_obs: Vec<f32>,

    /// One frame per step when capture was requested
    pub frames: Vec<Frame>,
}

impl Evaluation {
    /// Mean over instances of the summed reward
    pub fn mean_reward(&self) -> f32 {
        if self.total_reward.is_empty() {
            return 0.0;
        }
        self.total_reward.iter().sum::<f32>() / self.total_reward.len() as f32
    }
}

/// Run `policy` for `num_steps` steps on `env`, starting from `observations`
pub fn evaluate_policy<P, E>(
    policy: &P,
    env: &mut E,
    observations: Vec<f32>,
    num_steps: usize,
    capture_frames: bool,
) -> Result<Evaluation>
where
    P: ActorCritic + ?Sized,
    E: VecEnv + ?Sized,
{
    let num_envs = env.num_envs();
    let obs_shape = env.observation_space().shape;
    let device = policy.device();

    let mut total_reward = vec![0.0f32; num_envs];
    let mut frames = Vec::with_capacity(if capture_frames { num_steps } else { 0 });
    let mut obs = observations;

    for _ in 0..num_steps {
        let input = obs_to_tensor(&obs, num_envs, &obs_shape, device)?;
        let act = policy.act(&input)?;

        let step = env.step(&act.actions)?;
        for (total, reward) in total_reward.iter_mut().zip(&step.rewards) {
            *total += reward;
        }
        obs = step.observations;

        if capture_frames {
            frames.push(env.render(RenderMode::RgbArray)?);
        }
    }

    Ok(Evaluation { total_reward, last_obs: obs, frames })
}

#[cfg(test)]
mod tests {
    use tch::Device;

    use super::*;
    use crate::env::{dummy::ConstantEnv, pool::EnvPool};
    use crate::policy::mlp::{MlpConfig, MlpPolicy};

    #[test]
    fn test_evaluate_sums_rewards() {
        let policy = MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap();
        let mut env = EnvPool::new(|_| ConstantEnv::new(2.0, 4), 3);
        let obs = env.reset().unwrap();

        let param_sums = |p: &MlpPolicy| -> Vec<f64> {
            let params = p.var_store().trainable_variables();
            params.iter().map(|t| t.sum(tch::Kind::Float).double_value(&[])).collect()
        };

        let before = param_sums(&policy);
        let eval = evaluate_policy(&policy, &mut env, obs, 5, false).unwrap();
        let after = param_sums(&policy);

        assert_eq!(eval.total_reward, vec![10.0; 3]);
        assert!((eval.mean_reward() - 10.0).abs() < 1e-6);
        assert!(eval.frames.is_empty());
        assert_eq!(eval.last_obs.len(), 3);
        assert_eq!(before, after);
    }

    #[test]
    fn test_evaluate_captures_frames() {
        let policy = MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap();
        let mut env = EnvPool::new(|_| ConstantEnv::new(1.0, 8), 1);
        let obs = env.reset().unwrap();

        let eval = evaluate_policy(&policy, &mut env, obs, 6, true).unwrap();
        assert_eq!(eval.frames.len(), 6);
        assert_eq!(eval.frames[0].height, 8);
    }
}
