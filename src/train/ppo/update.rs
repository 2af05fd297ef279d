//! Policy update engine
//!
//! Several epochs of minibatch gradient descent over one completed rollout.

use anyhow::{Result, bail};
use rand::Rng;
use tch::nn;

use super::stats::TrainingStats;
use crate::buffer::rollout::TrajectoryStore;
use crate::policy::{ActorCritic, Mode};
use crate::utils::grad::clip_grad_norm;

/// Epoch/minibatch settings of one policy update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateEngine {
    /// Passes over the rollout per update
    pub num_epochs: usize,

    /// Samples per minibatch
    pub batch_size: usize,

    /// Maximum global gradient norm
    pub grad_eps: f64,
}

impl UpdateEngine {
    /// Create an engine with the given epoch, batch and clipping settings
    pub fn new(num_epochs: usize, batch_size: usize, grad_eps: f64) -> Self {
        Self { num_epochs, batch_size, grad_eps }
    }

    /// Optimize `policy` on the rollout in `store`
    ///
    /// Every epoch draws a fresh permutation. Per minibatch: training-mode
    /// forward pass, criterion, backward, global-norm clipping, optimizer
    /// step, gradient reset. A non-finite loss aborts with an error before
    /// any gradient from it is applied.
    ///
    /// Returns statistics averaged over all minibatch updates.
    pub fn run<P>(
        &self,
        policy: &P,
        optimizer: &mut nn::Optimizer,
        store: &TrajectoryStore,
        rng: &mut impl Rng,
    ) -> Result<TrainingStats>
    where
        P: ActorCritic + ?Sized,
    {
        let device = policy.device();
        let parameters = policy.var_store().trainable_variables();
        let mut stats_sum = TrainingStats::zeros();

        optimizer.zero_grad();
        for epoch in 0..self.num_epochs {
            for minibatch in store.get_generator_with(self.batch_size, rng) {
                let batch = minibatch.to_tensors(device)?;
                let (dist, values) = policy.forward(&batch.observations, Mode::Train);
                let output = policy.criterion(&batch, &dist, &values)?;

                if !output.stats.total_loss.is_finite() {
                    bail!(
                        "non-finite loss {} in epoch {} (policy {}, value {})",
                        output.stats.total_loss,
                        epoch,
                        output.stats.policy_loss,
                        output.stats.value_loss
                    );
                }

                output.loss.backward();
                let grad_norm = clip_grad_norm(&parameters, self.grad_eps)?;
                optimizer.step();
                optimizer.zero_grad();

                stats_sum += &output.stats.with_grad_norm(grad_norm);
            }
        }

        Ok(stats_sum.average())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use rand::{SeedableRng, rngs::StdRng};
    use tch::nn::OptimizerConfig;
    use tch::{Device, Kind, Tensor};

    use super::*;
    use crate::buffer::rollout::{StoreConfig, TensorBatch};
    use crate::env::StepInfo;
    use crate::policy::Categorical;
    use crate::policy::mlp::{MlpConfig, MlpPolicy};
    use crate::train::ppo::loss::LossOutput;

    fn filled_store(num_steps: usize, num_envs: usize) -> TrajectoryStore {
        let mut store = TrajectoryStore::new(&[1], num_steps, num_envs, StoreConfig::default());
        let infos = vec![StepInfo::default(); num_envs];
        for t in 0..num_steps {
            let obs: Vec<f32> = (0..num_envs).map(|e| (t + e) as f32 * 0.1).collect();
            let actions: Vec<i64> = (0..num_envs).map(|e| ((t + e) % 2) as i64).collect();
            let rewards: Vec<f32> = (0..num_envs).map(|e| ((t + e) % 2) as f32).collect();
            store.store(&obs, &actions, &rewards, &vec![true; num_envs], &infos, &vec![-0.69; num_envs], &vec![0.0; num_envs]);
        }
        store.store_last(&vec![0.0; num_envs], &vec![0.0; num_envs]);
        store.compute_return_advantage();
        store
    }

    /// Every observation is its own flat index, so batch contents reveal the permutation
    fn indexed_store(num_steps: usize, num_envs: usize) -> TrajectoryStore {
        let mut store = TrajectoryStore::new(&[1], num_steps, num_envs, StoreConfig::default());
        let infos = vec![StepInfo::default(); num_envs];
        for t in 0..num_steps {
            let obs: Vec<f32> = (0..num_envs).map(|e| (t * num_envs + e) as f32).collect();
            let rewards: Vec<f32> = (0..num_envs).map(|e| (e % 2) as f32).collect();
            let actions = vec![0; num_envs];
            let log_probs = vec![-0.69; num_envs];
            let values = vec![0.0; num_envs];
            store.store(&obs, &actions, &rewards, &vec![false; num_envs], &infos, &log_probs, &values);
        }
        store.store_last(&vec![0.0; num_envs], &vec![0.0; num_envs]);
        store.compute_return_advantage();
        store
    }

    fn snapshot(policy: &MlpPolicy) -> Vec<Tensor> {
        policy.var_store().trainable_variables().iter().map(|t| t.detach().copy()).collect()
    }

    #[test]
    fn test_update_changes_parameters() {
        let policy = MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap();
        let mut optimizer = policy.optimizer(1e-2, 1e-5).unwrap();
        let store = filled_store(8, 2);

        let before = snapshot(&policy);

        let engine = UpdateEngine::new(2, 5, 0.5);
        let stats = engine.run(&policy, &mut optimizer, &store, &mut StdRng::seed_from_u64(0)).unwrap();

        assert!(stats.grad_norm > 0.0);
        assert!(stats.total_loss.is_finite());

        let after = policy.var_store().trainable_variables();
        let changed = before.iter().zip(&after).any(|(b, a)| {
            let diff: f64 = (b - a).abs().sum(tch::Kind::Float).try_into().unwrap();
            diff > 0.0
        });
        assert!(changed);
    }

    /// Wraps a real policy but reports a NaN loss
    struct NanCriterion(MlpPolicy);

    impl ActorCritic for NanCriterion {
        fn device(&self) -> Device {
            self.0.device()
        }

        fn forward(&self, observations: &Tensor, mode: Mode) -> (Categorical, Tensor) {
            self.0.forward(observations, mode)
        }

        fn criterion(&self, batch: &TensorBatch, dist: &Categorical, values: &Tensor) -> Result<LossOutput> {
            let mut output = self.0.criterion(batch, dist, values)?;
            output.loss = &output.loss * f64::NAN;
            output.stats.total_loss = f64::NAN;
            Ok(output)
        }

        fn var_store(&self) -> &nn::VarStore {
            self.0.var_store()
        }
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let policy = NanCriterion(MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap());
        let mut optimizer = policy.0.optimizer(1e-3, 1e-5).unwrap();
        let store = filled_store(4, 2);

        let engine = UpdateEngine::new(1, 4, 0.5);
        let err = engine.run(&policy, &mut optimizer, &store, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(err.to_string().contains("non-finite loss"));
    }

    /// Records the observations of every training-mode forward pass
    struct Recording {
        inner: MlpPolicy,
        batches: RefCell<Vec<Vec<f32>>>,
    }

    impl Recording {
        fn new(inner: MlpPolicy) -> Self {
            Self { inner, batches: RefCell::new(Vec::new()) }
        }
    }

    impl ActorCritic for Recording {
        fn device(&self) -> Device {
            self.inner.device()
        }

        fn forward(&self, observations: &Tensor, mode: Mode) -> (Categorical, Tensor) {
            if mode.is_train() {
                let obs: Vec<f32> = Vec::try_from(observations.view([-1])).unwrap();
                self.batches.borrow_mut().push(obs);
            }
            self.inner.forward(observations, mode)
        }

        fn criterion(&self, batch: &TensorBatch, dist: &Categorical, values: &Tensor) -> Result<LossOutput> {
            self.inner.criterion(batch, dist, values)
        }

        fn var_store(&self) -> &nn::VarStore {
            self.inner.var_store()
        }
    }

    #[test]
    fn test_minibatch_count_per_epoch() {
        let policy = Recording::new(MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap());
        let mut optimizer = policy.inner.optimizer(1e-3, 1e-5).unwrap();
        let store = indexed_store(8, 2);

        // 16 samples in batches of 5 -> 4 minibatches per epoch
        UpdateEngine::new(2, 5, 0.5).run(&policy, &mut optimizer, &store, &mut StdRng::seed_from_u64(3)).unwrap();

        let sizes: Vec<usize> = policy.batches.borrow().iter().map(Vec::len).collect();
        assert_eq!(sizes.len(), 8);
        assert_eq!(sizes.iter().sum::<usize>(), 32);
        assert_eq!(sizes.iter().filter(|&&n| n == 1).count(), 2);
    }

    #[test]
    fn test_each_epoch_reshuffles() {
        let policy = Recording::new(MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap());
        let mut optimizer = policy.inner.optimizer(1e-3, 1e-5).unwrap();
        let store = indexed_store(8, 2);

        // One full-size minibatch per epoch
        UpdateEngine::new(2, store.len(), 0.5)
            .run(&policy, &mut optimizer, &store, &mut StdRng::seed_from_u64(7))
            .unwrap();

        let batches = policy.batches.borrow();
        assert_eq!(batches.len(), 2);
        for batch in batches.iter() {
            let mut sorted = batch.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            assert_eq!(sorted, (0..16).map(|i| i as f32).collect::<Vec<_>>());
        }
        assert_ne!(batches[0], batches[1]);
    }

    /// Scales the real loss up so its gradient is far above any clip threshold
    struct ScaledCriterion(MlpPolicy);

    impl ActorCritic for ScaledCriterion {
        fn device(&self) -> Device {
            self.0.device()
        }

        fn forward(&self, observations: &Tensor, mode: Mode) -> (Categorical, Tensor) {
            self.0.forward(observations, mode)
        }

        fn criterion(&self, batch: &TensorBatch, dist: &Categorical, values: &Tensor) -> Result<LossOutput> {
            let mut output = self.0.criterion(batch, dist, values)?;
            output.loss = &output.loss * 1e3;
            Ok(output)
        }

        fn var_store(&self) -> &nn::VarStore {
            self.0.var_store()
        }
    }

    #[test]
    fn test_update_step_is_clipped() {
        let policy = ScaledCriterion(MlpPolicy::on_device(&[1], 2, MlpConfig::default(), Device::Cpu).unwrap());
        // Plain SGD with lr 1: the parameter change equals the applied gradient
        let mut optimizer = nn::Sgd::default().build(policy.var_store(), 1.0).unwrap();
        let store = indexed_store(8, 2);
        let before = snapshot(&policy.0);

        let grad_eps = 0.5;
        let stats = UpdateEngine::new(1, store.len(), grad_eps)
            .run(&policy, &mut optimizer, &store, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(stats.grad_norm > grad_eps, "gradient too small to exercise clipping: {}", stats.grad_norm);

        let after = policy.var_store().trainable_variables();
        let step_norm = before
            .iter()
            .zip(&after)
            .map(|(b, a)| (a - b).square().sum(Kind::Float).double_value(&[]))
            .sum::<f64>()
            .sqrt();
        assert!(step_norm > 0.0);
        assert!(step_norm <= grad_eps + 1e-3, "update step norm {} exceeds {}", step_norm, grad_eps);
    }
}
