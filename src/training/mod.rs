//! Training driver, learning-rate schedules, and acceptance criteria.
//!
//! The driver owns the epoch loop: it resolves the instantaneous learning
//! rate, streams batches through the active update rule, and emits snapshots
//! at the configured cadence. Weight updates are hand-derived array
//! expressions — there is no gradient tape anywhere to disable. Exactly one
//! writer (the driver, through the rule) mutates the weight matrix.
//!
//! After training, two independent acceptance criteria decide whether the
//! learned weights are usable; failing them is a terminal `Rejected` outcome,
//! not an error.

use std::fmt;

use crate::checkpoint::SnapshotSink;
use crate::core::{Learner, LocalLayer};
use crate::data::BatchSource;

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, not yet run.
    Idle,
    /// Streaming batches through the update rule.
    Running,
    /// Emitting a snapshot to the persistence sink.
    Checkpointing,
    /// All epochs finished (and, if consulted, the criteria passed).
    Done,
    /// An acceptance criterion failed; the result should not be persisted.
    Rejected,
}

/// Instantaneous learning rate as a function of the (1-based) epoch.
pub enum LearningRate {
    /// Constant rate `1 / tau_l` taken from the layer configuration.
    FromLayer,
    /// Constant explicit rate.
    Constant(f32),
    /// Arbitrary schedule `epoch -> rate`. A rate of exactly 0 makes the
    /// driver skip that epoch's weight updates entirely.
    Schedule(Box<dyn Fn(usize) -> f32>),
}

impl LearningRate {
    /// Resolve the rate for `epoch`, given the layer's own time constant.
    pub fn at(&self, epoch: usize, layer_tau: f32) -> f32 {
        match self {
            LearningRate::FromLayer => 1.0 / layer_tau,
            LearningRate::Constant(lr) => *lr,
            LearningRate::Schedule(f) => f(epoch),
        }
    }

    /// Linearly decaying schedule `lr(e) = (1 - e/total) * lr0`.
    ///
    /// Reaches exactly 0 at the final epoch, which the driver treats as a
    /// no-learning epoch.
    pub fn linear_decay(lr0: f32, total_epochs: usize) -> Self {
        let total = total_epochs as f32;
        LearningRate::Schedule(Box::new(move |epoch| (1.0 - epoch as f32 / total) * lr0))
    }
}

impl fmt::Debug for LearningRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearningRate::FromLayer => write!(f, "LearningRate::FromLayer"),
            LearningRate::Constant(lr) => write!(f, "LearningRate::Constant({})", lr),
            LearningRate::Schedule(_) => write!(f, "LearningRate::Schedule(..)"),
        }
    }
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Number of epochs, numbered 1..=epochs.
    pub epochs: usize,
    /// Snapshot cadence in epochs; 0 disables checkpointing.
    pub checkpoint_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 5,
            checkpoint_every: 1,
        }
    }
}

/// Per-epoch bookkeeping returned by [`Trainer::run`].
#[derive(Debug, Clone)]
pub struct EpochStats {
    pub epoch: usize,
    pub lr: f32,
    pub batches: usize,
    pub samples: usize,
}

/// Epoch/checkpoint loop around one [`Learner`].
///
/// # Example
/// ```ignore
/// let mut trainer = Trainer::new(&mut learner, LearningRate::FromLayer, TrainConfig::default());
/// trainer.run(&mut loader, &mut sink)?;
/// if trainer.accept(1e-2, 0.1) {
///     // persist the final model
/// }
/// ```
pub struct Trainer<'a> {
    learner: &'a mut dyn Learner,
    schedule: LearningRate,
    config: TrainConfig,
    phase: Phase,
}

impl<'a> Trainer<'a> {
    pub fn new(learner: &'a mut dyn Learner, schedule: LearningRate, config: TrainConfig) -> Self {
        Self {
            learner,
            schedule,
            config,
            phase: Phase::Idle,
        }
    }

    /// Current driver state.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run all epochs, pulling batches from `source` and checkpointing to `sink`.
    ///
    /// An epoch whose resolved learning rate is exactly 0 performs no weight
    /// updates but still advances and still checkpoints on cadence. For any
    /// other rate the update rule receives `tau_l = 1/lr`; the layer's own
    /// configuration is left untouched.
    ///
    /// # Errors
    /// Propagates update-rule shape errors and sink I/O errors; either aborts
    /// the run mid-epoch, leaving the weights partially updated but valid.
    pub fn run(
        &mut self,
        source: &mut dyn BatchSource,
        sink: &mut dyn SnapshotSink,
    ) -> Result<Vec<EpochStats>, String> {
        self.phase = Phase::Running;
        let base_tau = self.learner.layer().config.tau_l;
        let mut stats = Vec::with_capacity(self.config.epochs);

        for epoch in 1..=self.config.epochs {
            let lr = self.schedule.at(epoch, base_tau);
            let mut batches = 0;
            let mut samples = 0;

            if lr != 0.0 {
                let tau_l = 1.0 / lr;
                source.reset();
                while let Some((features, _labels)) = source.next_batch() {
                    self.learner
                        .train_step_at(&features, tau_l)
                        .map_err(|e| e.to_string())?;
                    batches += 1;
                    samples += features.nrows();
                }
            }

            if self.config.checkpoint_every > 0 && epoch % self.config.checkpoint_every == 0 {
                self.phase = Phase::Checkpointing;
                sink.save(epoch, &*self.learner)?;
                self.phase = Phase::Running;
            }

            stats.push(EpochStats {
                epoch,
                lr,
                batches,
                samples,
            });
        }

        self.phase = Phase::Done;
        Ok(stats)
    }

    /// Consult both acceptance criteria and settle the final state.
    ///
    /// Returns `true` (state `Done`) if the weights pass, `false` (state
    /// `Rejected`) otherwise. Rejection is an outcome for the caller to act
    /// on, never an error.
    pub fn accept(&mut self, tol: f32, min_fraction: f32) -> bool {
        let layer = self.learner.layer();
        let ok = weight_convergence_criterion(layer, tol, min_fraction)
            && weight_mean_criterion(layer);
        self.phase = if ok { Phase::Done } else { Phase::Rejected };
        ok
    }
}

/// Weight convergence criterion.
///
/// Passes when the fraction of hidden units whose Lp column norm lies within
/// `tol` of the target radius is at least `min_fraction`. Pure and
/// deterministic; scaling norms closer to the radius can only grow the
/// passing fraction.
pub fn weight_convergence_criterion(layer: &LocalLayer, tol: f32, min_fraction: f32) -> bool {
    let norms = layer.unit_norms();
    if norms.is_empty() {
        return false;
    }
    let close = norms
        .iter()
        .filter(|&&n| (n - layer.config.radius).abs() < tol)
        .count();
    close as f32 / norms.len() as f32 >= min_fraction
}

/// Weight mean criterion.
///
/// The learned attractor concentrates weight mass on a positive-radius shell
/// with positive mean; a non-positive mean indicates collapse to the
/// mirrored/degenerate attractor and rejects the run.
pub fn weight_mean_criterion(layer: &LocalLayer) -> bool {
    layer.w.mean().unwrap_or(0.0) > 0.0
}
