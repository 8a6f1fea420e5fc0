//! # local-learning
//!
//! Competitive unsupervised weight learning from first principles.
//!
//! ## Overview
//!
//! The layers in this crate learn without a loss gradient: each weight update
//! is computed from local pre- and post-synaptic quantities under a
//! winner-take-k competition, with synaptic overlaps measured in a
//! generalized Lp "bracket" metric that depends on the current weight
//! magnitudes. Two interchangeable update rules are provided — an exact
//! sequential rule that mutates the weights after every sample, and a fast
//! rule that folds a whole minibatch into one closed-form increment.
//!
//! ## Structure
//!
//! - [`core`] — metric engine, competitive activations, update rules
//! - [`training`] — training driver, learning-rate schedules, acceptance criteria
//! - [`checkpoint`] — snapshot persistence for trained layers
//! - [`data`] — dataset loading, Lp normalization, batch production
//! - [`model`] — supervised classifier head on top of a trained layer
//! - [`utils`] — small math helpers

pub mod checkpoint;
pub mod core;
pub mod data;
pub mod model;
pub mod training;
pub mod utils;

use serde::{Deserialize, Serialize};

pub use crate::core::{
    g_fast, g_sequential, FastLearner, LayerError, LayerResult, Learner, LocalLayer,
    SequentialLearner,
};
pub use crate::training::{
    weight_convergence_criterion, weight_mean_criterion, LearningRate, Phase, TrainConfig, Trainer,
};

/// Hyperparameters of one competitive local-learning layer.
///
/// Constructed once, validated once, and never mutated afterwards — the
/// training driver threads its per-epoch learning rate through the update
/// call instead of rewriting `tau_l`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Input dimension (length of each flattened sample).
    pub in_size: usize,
    /// Number of hidden units (columns of the weight matrix).
    pub hidden_size: usize,
    /// Post-hoc activation exponent, used only by downstream classifiers.
    pub n: f32,
    /// Metric exponent of the generalized inner product, `p >= 2`.
    pub p: f32,
    /// Learning-rate time constant, `tau_l > 0` (learning rate is `1/tau_l`).
    pub tau_l: f32,
    /// Competition size: how many units rank into the top-k, `1 <= k <= hidden_size`.
    pub k: usize,
    /// Inhibition strength applied to inhibited top-k units, typically in (0, 1].
    pub delta: f32,
    /// Target weight-norm radius the learned columns converge towards, `> 0`.
    pub radius: f32,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            in_size: 28 * 28,
            hidden_size: 2000,
            n: 4.5,
            p: 3.0,
            tau_l: 1.0 / 0.04,
            k: 7,
            delta: 0.4,
            radius: 1.0,
        }
    }
}

impl LayerConfig {
    /// Validate the parameter combination.
    ///
    /// Invalid combinations are construction-time errors; nothing downstream
    /// re-checks them.
    ///
    /// # Errors
    /// `InvalidConfig` if any dimension is zero, `k` is out of `1..=hidden_size`,
    /// `p < 2`, or any of `tau_l`, `delta`, `radius` is non-positive or non-finite.
    pub fn validate(&self) -> LayerResult<()> {
        if self.in_size == 0 || self.hidden_size == 0 {
            return Err(LayerError::InvalidConfig(
                "in_size and hidden_size must be nonzero".to_string(),
            ));
        }
        if self.k == 0 || self.k > self.hidden_size {
            return Err(LayerError::InvalidConfig(format!(
                "k must be in 1..=hidden_size, got k={} with hidden_size={}",
                self.k, self.hidden_size
            )));
        }
        if !self.p.is_finite() || self.p < 2.0 {
            return Err(LayerError::InvalidConfig(format!(
                "metric exponent p must be finite and >= 2, got {}",
                self.p
            )));
        }
        if !self.tau_l.is_finite() || self.tau_l <= 0.0 {
            return Err(LayerError::InvalidConfig(format!(
                "tau_l must be finite and > 0, got {}",
                self.tau_l
            )));
        }
        if !self.delta.is_finite() || self.delta <= 0.0 {
            return Err(LayerError::InvalidConfig(format!(
                "delta must be finite and > 0, got {}",
                self.delta
            )));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(LayerError::InvalidConfig(format!(
                "radius must be finite and > 0, got {}",
                self.radius
            )));
        }
        if !self.n.is_finite() {
            return Err(LayerError::InvalidConfig(format!(
                "activation exponent n must be finite, got {}",
                self.n
            )));
        }
        Ok(())
    }
}
