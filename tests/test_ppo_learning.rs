//! Verify a PPO update moves the policy toward high-advantage actions
//!
//! The rollout is synthetic and every step is terminal, so with zero value
//! estimates each advantage is exactly the reward:
//! - obs=0: action 0 earns +1, action 1 earns -1
//! - obs=1: action 1 earns +1, action 0 earns -1
//!
//! After one update P(action=0 | obs=0) and P(action=1 | obs=1) must rise.

use rand::{SeedableRng, rngs::StdRng};
use rollout_rl::{
    buffer::rollout::{StoreConfig, TrajectoryStore},
    env::StepInfo,
    policy::{
        ActorCritic, Mode,
        mlp::{MlpConfig, MlpPolicy},
    },
    train::ppo::{PpoLossConfig, UpdateEngine},
};
use tch::{Device, Tensor};

fn synthetic_store() -> TrajectoryStore {
    let config = StoreConfig { normalize_advantage: false, ..Default::default() };
    let mut store = TrajectoryStore::new(&[1], 4, 2, config);
    let infos = vec![StepInfo::default(); 2];
    let log_half = 0.5f32.ln();

    // Env 0 always sees obs=0, env 1 always sees obs=1
    for step in 0..4 {
        let correct = step < 2;
        let (actions, rewards) = if correct { ([0, 1], [1.0, 1.0]) } else { ([1, 0], [-1.0, -1.0]) };
        store.store(&[0.0, 1.0], &actions, &rewards, &[true, true], &infos, &[log_half, log_half], &[0.0, 0.0]);
    }
    store.store_last(&[0.0, 1.0], &[0.0, 0.0]);
    store.compute_return_advantage();
    store
}

fn correct_action_probs(policy: &MlpPolicy) -> (f32, f32) {
    let obs = Tensor::from_slice(&[0.0f32, 1.0]).view([2, 1]);
    let (dist, _) = policy.forward(&obs, Mode::Eval);
    let probs: Vec<f32> = Vec::try_from(dist.probs().view([-1])).unwrap();
    // Row-major [2, 2]: P(0|obs=0) at 0, P(1|obs=1) at 3
    (probs[0], probs[3])
}

#[test]
fn test_ppo_learns_from_synthetic_data() {
    let policy = MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu)
        .unwrap()
        .with_loss(PpoLossConfig::default().ent_coef(0.0));
    let mut optimizer = policy.optimizer(0.01, 1e-5).unwrap();
    let store = synthetic_store();

    // Advantage is exactly the reward
    assert_eq!(store.advantages()[0], 1.0);
    assert_eq!(store.advantages()[7], -1.0);

    let (p0_before, p1_before) = correct_action_probs(&policy);

    let engine = UpdateEngine::new(10, 8, 0.5);
    let stats = engine.run(&policy, &mut optimizer, &store, &mut StdRng::seed_from_u64(0)).unwrap();
    assert!(stats.total_loss.is_finite());

    let (p0_after, p1_after) = correct_action_probs(&policy);
    println!("P(0|0): {:.4} -> {:.4}", p0_before, p0_after);
    println!("P(1|1): {:.4} -> {:.4}", p1_before, p1_after);

    assert!(p0_after > p0_before + 0.02, "P(0|0) did not increase: {} -> {}", p0_before, p0_after);
    assert!(p1_after > p1_before + 0.02, "P(1|1) did not increase: {} -> {}", p1_before, p1_after);
}

#[test]
fn test_gradient_norm_is_clipped() {
    let policy = MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap();
    let store = synthetic_store();
    let batch = store.get_generator(8).next().unwrap().to_tensors(Device::Cpu).unwrap();

    let (dist, values) = policy.forward(&batch.observations, Mode::Train);
    let output = policy.criterion(&batch, &dist, &values).unwrap();
    // Scale up so clipping is guaranteed to engage
    (&output.loss * 1000.0).backward();

    let params = policy.var_store().trainable_variables();
    let before = rollout_rl::utils::grad::clip_grad_norm(&params, 0.1).unwrap();
    let after = rollout_rl::utils::grad::grad_norm(&params).unwrap();

    assert!(before > 0.1);
    assert!(after <= 0.1 + 1e-4, "norm after clipping: {}", after);
}
