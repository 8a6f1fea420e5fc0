//! Dataset loading, Lp normalization, and batch production.
//!
//! ## Submodules
//!
//! - [`cifar`] — CIFAR-10 binary format loading
//!
//! The unsupervised layer assumes its inputs are already unit-normalized in
//! the same Lp metric it learns under; [`lp_unit_normalize`] performs that
//! preprocessing. Batches reach the training driver through the
//! [`BatchSource`] trait — a blocking pull of `(features, labels)` pairs
//! (the unsupervised rule ignores the labels).

pub mod cifar;

pub use cifar::{load_cifar10_batch, load_cifar10_test, load_cifar10_train, ImageDataset};

use ndarray::{Array2, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

/// Lp norm of a flat sample.
pub fn lp_norm(sample: &[f32], p: f32) -> f32 {
    sample
        .iter()
        .map(|x| x.abs().powf(p))
        .sum::<f32>()
        .powf(1.0 / p)
}

/// Scale every sample to unit Lp norm, in parallel.
///
/// Samples with zero norm are left untouched.
pub fn lp_unit_normalize(samples: &mut [Vec<f32>], p: f32) {
    samples.par_iter_mut().for_each(|sample| {
        let norm = lp_norm(sample, p);
        if norm > 0.0 {
            for v in sample.iter_mut() {
                *v /= norm;
            }
        }
    });
}

/// Synthetic Gaussian dataset, `n` samples of dimension `dim`.
///
/// # Errors
/// Returns an error if `sigma` is not a valid standard deviation.
pub fn gaussian_dataset(n: usize, dim: usize, sigma: f32, seed: u64) -> Result<Array2<f32>, String> {
    let dist =
        Normal::new(0.0f32, sigma).map_err(|e| format!("invalid sigma {sigma}: {e}"))?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(Array2::random_using((n, dim), dist, &mut rng))
}

/// Producer of fixed-shape training batches.
///
/// The training driver pulls batches with a blocking call until `None`,
/// then calls [`reset`](BatchSource::reset) at the start of the next epoch.
pub trait BatchSource {
    /// Rewind to the start of an epoch (reshuffling if configured).
    fn reset(&mut self);

    /// Next `(features, labels)` batch, or `None` when the epoch is exhausted.
    ///
    /// Features have shape `(batch_size, in_size)`; the final batch of an
    /// epoch may be smaller.
    fn next_batch(&mut self) -> Option<(Array2<f32>, Vec<u8>)>;
}

/// In-memory [`BatchSource`] with optional seeded shuffling.
#[derive(Debug, Clone)]
pub struct InMemoryLoader {
    features: Array2<f32>,
    labels: Vec<u8>,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
}

impl InMemoryLoader {
    /// Create a loader over a dataset held in memory.
    ///
    /// # Errors
    /// Returns an error if `batch_size` is 0 or the label count does not
    /// match the number of feature rows.
    pub fn new(
        features: Array2<f32>,
        labels: Vec<u8>,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> Result<Self, String> {
        if batch_size == 0 {
            return Err("batch_size must be nonzero".to_string());
        }
        if labels.len() != features.nrows() {
            return Err(format!(
                "{} labels for {} samples",
                labels.len(),
                features.nrows()
            ));
        }
        let order = (0..features.nrows()).collect();
        Ok(Self {
            features,
            labels,
            batch_size,
            shuffle,
            rng: StdRng::seed_from_u64(seed),
            order,
            cursor: 0,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    /// Input dimension of each sample.
    pub fn sample_dim(&self) -> usize {
        self.features.ncols()
    }
}

impl BatchSource for InMemoryLoader {
    fn reset(&mut self) {
        self.cursor = 0;
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    fn next_batch(&mut self) -> Option<(Array2<f32>, Vec<u8>)> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let idxs = &self.order[self.cursor..end];
        let features = self.features.select(Axis(0), idxs);
        let labels = idxs.iter().map(|&i| self.labels[i]).collect();
        self.cursor = end;
        Some((features, labels))
    }
}
