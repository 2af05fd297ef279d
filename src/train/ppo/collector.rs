//! Rollout collection
//!
//! Drives a vectorized environment under the current policy for one window
//! and writes every transition into the trajectory store.

use anyhow::Result;

use crate::buffer::rollout::TrajectoryStore;
use crate::env::VecEnv;
use crate::policy::{ActorCritic, obs_to_tensor};

/// Fill `store` with `num_steps` transitions starting from `observations`
///
/// The store is reset first. After the last step the policy is queried once
/// more on the final observation and only its value estimate is kept as the
/// bootstrap; that action is never sent to the environment. Returns the
/// final observation so the next rollout continues from it.
pub fn collect_rollout<P, E>(
    policy: &P,
    env: &mut E,
    store: &mut TrajectoryStore,
    observations: Vec<f32>,
) -> Result<Vec<f32>>
where
    P: ActorCritic + ?Sized,
    E: VecEnv + ?Sized,
{
    store.reset();
    let (num_steps, num_envs, _) = store.shape();
    let obs_shape = store.obs_shape().to_vec();
    let device = policy.device();

    let mut obs = observations;
    let mut finished = 0usize;
    let mut finished_return = 0.0f32;

    for _ in 0..num_steps {
        let input = obs_to_tensor(&obs, num_envs, &obs_shape, device)?;
        let act = policy.act(&input)?;

        let step = env.step(&act.actions)?;
        store.store(&obs, &act.actions, &step.rewards, &step.dones, &step.infos, &act.log_probs, &act.values);

        for episode in step.infos.iter().filter_map(|info| info.episode) {
            finished += 1;
            finished_return += episode.total_reward;
        }
        obs = step.observations;
    }

    let input = obs_to_tensor(&obs, num_envs, &obs_shape, device)?;
    let bootstrap = policy.act(&input)?;
    store.store_last(&obs, &bootstrap.values);

    if finished > 0 {
        tracing::debug!(
            episodes = finished,
            mean_return = finished_return / finished as f32,
            "rollout finished episodes"
        );
    }
    Ok(obs)
}

#[cfg(test)]
mod tests {
    use tch::Device;

    use super::*;
    use crate::buffer::rollout::StoreConfig;
    use crate::env::{dummy::ConstantEnv, pool::EnvPool};
    use crate::policy::mlp::{MlpConfig, MlpPolicy};

    #[test]
    fn test_collect_fills_store() {
        let policy = MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap();
        let mut env = EnvPool::new(|_| ConstantEnv::new(1.0, 3), 2);
        let mut store = TrajectoryStore::new(&[1], 4, 2, StoreConfig::default());

        let obs = env.reset().unwrap();
        let last = collect_rollout(&policy, &mut env, &mut store, obs).unwrap();

        assert_eq!(store.cursor(), 4);
        assert!((store.get_reward() - 4.0).abs() < 1e-6);
        assert_eq!(last, store.bootstrap_observations());
        // Episodes of length 3 end on step index 2
        assert!(store.transition(2, 0).done);
        assert!(!store.transition(3, 1).done);
        assert!(store.log_probs().iter().all(|&lp| lp <= 0.0));

        store.compute_return_advantage();
        assert!(store.is_ready());
    }

    #[test]
    fn test_collect_twice_reuses_store() {
        let policy = MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap();
        let mut env = EnvPool::new(|_| ConstantEnv::new(0.5, 10), 1);
        let mut store = TrajectoryStore::new(&[1], 3, 1, StoreConfig::default());

        let obs = env.reset().unwrap();
        let obs = collect_rollout(&policy, &mut env, &mut store, obs).unwrap();
        collect_rollout(&policy, &mut env, &mut store, obs).unwrap();

        // Second window continues the episode: progress 0.3, 0.4, 0.5
        assert!((store.transition(0, 0).observation[0] - 0.3).abs() < 1e-6);
        assert_eq!(env.get(0).steps(), 6);
    }
}
