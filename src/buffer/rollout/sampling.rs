//! Minibatch sampling from a completed rollout
//!
//! One [`MinibatchGenerator`] is one epoch: a fresh uniform permutation of
//! all `num_steps * num_envs` flat indices, cut into consecutive chunks of
//! `batch_size`. The last chunk is smaller when the capacity is not a
//! multiple of the batch size. The generator is finite and cannot be
//! rewound; ask the store for a new one each epoch.

use anyhow::Result;
use rand::{Rng, seq::SliceRandom, thread_rng};
use tch::{Device, Tensor};

use super::storage::TrajectoryStore;

/// One sampled minibatch, gathered out of the store in host memory
#[derive(Debug, Clone)]
pub struct Minibatch {
    /// Flat indices `step * num_envs + env` this batch was drawn from
    pub indices: Vec<usize>,

    /// Observations `[batch_size * obs_len]`
    pub observations: Vec<f32>,

    /// Actions `[batch_size]`
    pub actions: Vec<i64>,

    /// Log probabilities under the collecting policy `[batch_size]`
    pub old_log_probs: Vec<f32>,

    /// Value estimates under the collecting policy `[batch_size]`
    pub old_values: Vec<f32>,

    /// Return targets `[batch_size]`
    pub returns: Vec<f32>,

    /// TD residuals `[batch_size]`
    pub deltas: Vec<f32>,

    /// Advantages `[batch_size]`
    pub advantages: Vec<f32>,

    obs_shape: Vec<usize>,
}

impl Minibatch {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Per-sample observation shape
    pub fn obs_shape(&self) -> &[usize] {
        &self.obs_shape
    }

    /// Move the batch onto `device` as tensors
    pub fn to_tensors(&self, device: Device) -> Result<TensorBatch> {
        let mut shape = vec![self.len() as i64];
        shape.extend(self.obs_shape.iter().map(|&d| d as i64));

        let observations =
            Tensor::from_slice(&self.observations).f_reshape(shape.as_slice())?.to_device(device);
        let vector = |v: &[f32]| Tensor::from_slice(v).to_device(device);

        Ok(TensorBatch {
            observations,
            actions: Tensor::from_slice(&self.actions).to_device(device),
            old_log_probs: vector(&self.old_log_probs),
            old_values: vector(&self.old_values),
            returns: vector(&self.returns),
            deltas: vector(&self.deltas),
            advantages: vector(&self.advantages),
        })
    }
}

/// A minibatch on the training device
#[derive(Debug)]
pub struct TensorBatch {
    /// `[B, *obs_shape]`
    pub observations: Tensor,

    /// `[B]`, Int64
    pub actions: Tensor,

    /// `[B]`
    pub old_log_probs: Tensor,

    /// `[B]`
    pub old_values: Tensor,

    /// `[B]`
    pub returns: Tensor,

    /// `[B]`
    pub deltas: Tensor,

    /// `[B]`
    pub advantages: Tensor,
}

/// Single-epoch iterator over shuffled minibatches of a store
pub struct MinibatchGenerator<'a> {
    store: &'a TrajectoryStore,
    permutation: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl<'a> MinibatchGenerator<'a> {
    fn new(store: &'a TrajectoryStore, batch_size: usize, rng: &mut impl Rng) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        assert!(
            store.is_ready(),
            "compute_return_advantage must run before sampling minibatches"
        );

        let mut permutation: Vec<usize> = (0..store.len()).collect();
        permutation.shuffle(rng);

        Self { store, permutation, batch_size, position: 0 }
    }

    /// Number of minibatches this generator yields in total
    pub fn num_batches(&self) -> usize {
        self.permutation.len().div_ceil(self.batch_size)
    }

    fn gather(&self, indices: &[usize]) -> Minibatch {
        let store = self.store;
        let (_, _, obs_len) = store.shape();

        let mut observations = Vec::with_capacity(indices.len() * obs_len);
        for &i in indices {
            observations.extend_from_slice(store.observation(i));
        }
        let pick_f32 = |src: &[f32]| indices.iter().map(|&i| src[i]).collect::<Vec<f32>>();

        Minibatch {
            indices: indices.to_vec(),
            observations,
            actions: indices.iter().map(|&i| store.actions()[i]).collect(),
            old_log_probs: pick_f32(store.log_probs()),
            old_values: pick_f32(store.values()),
            returns: pick_f32(store.returns()),
            deltas: pick_f32(store.deltas()),
            advantages: pick_f32(store.advantages()),
            obs_shape: store.obs_shape().to_vec(),
        }
    }
}

impl Iterator for MinibatchGenerator<'_> {
    type Item = Minibatch;

    fn next(&mut self) -> Option<Minibatch> {
        if self.position >= self.permutation.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.permutation.len());
        let batch = self.gather(&self.permutation[self.position..end]);
        self.position = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.permutation.len() - self.position).div_ceil(self.batch_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for MinibatchGenerator<'_> {}

impl TrajectoryStore {
    /// Shuffled minibatches for one epoch, using the thread-local RNG
    ///
    /// # Panics
    ///
    /// Panics if returns and advantages have not been computed, or if
    /// `batch_size` is zero.
    pub fn get_generator(&self, batch_size: usize) -> MinibatchGenerator<'_> {
        MinibatchGenerator::new(self, batch_size, &mut thread_rng())
    }

    /// Like [`TrajectoryStore::get_generator`], with an explicit RNG
    pub fn get_generator_with(&self, batch_size: usize, rng: &mut impl Rng) -> MinibatchGenerator<'_> {
        MinibatchGenerator::new(self, batch_size, rng)
    }
}
