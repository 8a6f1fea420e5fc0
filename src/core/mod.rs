//! Core competitive local-learning algorithm.
//!
//! This module provides the fundamental structures and operations:
//! - Generalized Lp "bracket" metric over the weight matrix
//! - Winner-take-k competitive activations
//! - Sequential and fast (batched) weight-increment rules
//!
//! ## The bracket metric
//!
//! Overlaps between inputs and hidden units are measured with a metric that
//! depends on the current weight magnitudes:
//! ```text
//! <v, M> = Σ_i v_i · M_ij · |W_ij|^(p-2)
//! ```
//! For `p = 2` this reduces to the ordinary dot product; larger `p` makes
//! strong synapses dominate the overlap.
//!
//! ## The update rules
//!
//! Both rules drive each winning unit's weight column towards a shell of
//! radius `R` in the bracket norm:
//! ```text
//! ΔW[:,j] = g_j · (R^p · v − h_j · W[:,j])
//! ```
//! where `g` is the competitive activation and `h` the overlap vector. The
//! sequential rule applies this after every sample; the fast rule folds a
//! whole minibatch into one increment and normalizes it by its largest
//! entry, trading exactness for parallel batch processing.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;
use std::fmt;

use crate::LayerConfig;

/// Precision floor for the fast rule's increment normalization.
pub const DEFAULT_PREC: f32 = 1e-9;

/// Error type for layer operations.
#[derive(Debug, Clone)]
pub enum LayerError {
    /// Invalid parameter combination, rejected at construction time.
    InvalidConfig(String),
    /// Shape mismatch in matrix operations.
    ShapeMismatch(String),
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            LayerError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
        }
    }
}

impl Error for LayerError {}

pub type LayerResult<T> = Result<T, LayerError>;

/// Indices of the top-`k` entries of `q`, ranked descending by value.
///
/// Ties are broken deterministically: the lower index wins. This is the
/// tie-break policy for both competitive activations.
pub fn ranked_indices(q: ArrayView1<f32>, k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..q.len()).collect();
    idx.sort_by(|&a, &b| q[b].total_cmp(&q[a]).then(a.cmp(&b)));
    idx.truncate(k);
    idx
}

/// Competitive activation of the sequential rule.
///
/// The top-ranked unit receives `+1`; every remaining unit of the top-k
/// (ranks 2..k) receives `-delta`; all other units are zero.
pub fn g_sequential(q: &Array1<f32>, k: usize, delta: f32) -> Array1<f32> {
    let mut g = Array1::zeros(q.len());
    let top = ranked_indices(q.view(), k);
    g[top[0]] = 1.0;
    for &j in &top[1..] {
        g[j] = -delta;
    }
    g
}

/// Competitive activation of the fast rule, applied per batch row.
///
/// The top-ranked unit receives `+1` and only the k-th ranked unit (the
/// anti-winner) receives `-delta`. The inhibition pattern intentionally
/// differs from [`g_sequential`]: inhibiting a single unit is what makes the
/// closed-form batched increment tractable. For `k == 1` the anti-winner
/// assignment lands on the winner and overwrites it with `-delta`.
pub fn g_fast(q: &Array2<f32>, k: usize, delta: f32) -> Array2<f32> {
    let mut g = Array2::zeros(q.raw_dim());
    for (row, mut g_row) in q.rows().into_iter().zip(g.rows_mut()) {
        let top = ranked_indices(row, k);
        g_row[top[0]] = 1.0;
        g_row[top[k - 1]] = -delta;
    }
    g
}

/// Weight matrix of one local-learning unit together with its parameters.
///
/// The matrix has shape `(in_size, hidden_size)`; each column is the synapse
/// vector of one hidden unit. The struct is exclusively owned by a single
/// [`Learner`] and mutated in place by its update rule.
#[derive(Debug, Clone)]
pub struct LocalLayer {
    /// Immutable layer parameters.
    pub config: LayerConfig,
    /// Weight matrix, shape `(in_size, hidden_size)`.
    pub w: Array2<f32>,
}

impl LocalLayer {
    /// Create a layer with Gaussian weights at the default scale.
    ///
    /// The scale follows the Glorot scheme, `sigma = 1/sqrt(in + hidden)`.
    ///
    /// # Errors
    /// `InvalidConfig` if the parameter combination fails validation.
    pub fn new(config: LayerConfig) -> LayerResult<Self> {
        Self::with_init(config, None, None)
    }

    /// Create a layer with Gaussian weights `N(0, sigma²)`.
    ///
    /// # Arguments
    /// - `sigma`: weight standard deviation; `None` selects the Glorot scale
    /// - `seed`: RNG seed for reproducible initialization; `None` draws from entropy
    ///
    /// # Errors
    /// `InvalidConfig` if the parameter combination fails validation.
    pub fn with_init(config: LayerConfig, sigma: Option<f32>, seed: Option<u64>) -> LayerResult<Self> {
        config.validate()?;
        let sigma = sigma
            .unwrap_or_else(|| 1.0 / ((config.in_size + config.hidden_size) as f32).sqrt());
        let dist = Normal::new(0.0f32, sigma)
            .map_err(|e| LayerError::InvalidConfig(format!("invalid sigma {}: {}", sigma, e)))?;
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let w = Array2::random_using((config.in_size, config.hidden_size), dist, &mut rng);
        Ok(Self { config, w })
    }

    /// Reconstruct a layer from an existing weight matrix.
    ///
    /// # Errors
    /// `InvalidConfig` if validation fails, `ShapeMismatch` if the matrix
    /// does not have shape `(in_size, hidden_size)`.
    pub fn from_weights(config: LayerConfig, w: Array2<f32>) -> LayerResult<Self> {
        config.validate()?;
        if w.dim() != (config.in_size, config.hidden_size) {
            return Err(LayerError::ShapeMismatch(format!(
                "weight matrix is {:?}, expected ({}, {})",
                w.dim(),
                config.in_size,
                config.hidden_size
            )));
        }
        Ok(Self { config, w })
    }

    /// Per-entry metric tensor `|W|^(p-2)`.
    ///
    /// Zero weights contribute zero for `p > 2` and, via `0^0 == 1`, the
    /// multiplicative identity for `p == 2`; neither case is a domain error.
    pub fn metric_tensor(&self) -> Array2<f32> {
        let exponent = self.config.p - 2.0;
        self.w.mapv(|w| w.abs().powf(exponent))
    }

    /// Generalized inner product between a batch of inputs and a matrix.
    ///
    /// # Algorithm
    /// ```text
    /// bracket(v, M)[b, j] = Σ_i v[b, i] · M[i, j] · |W[i, j]|^(p-2)
    /// ```
    ///
    /// # Errors
    /// `ShapeMismatch` if `v` is not `(batch, in_size)` or `M` does not match
    /// the weight matrix shape.
    pub fn bracket(&self, v: &Array2<f32>, m: &Array2<f32>) -> LayerResult<Array2<f32>> {
        if v.ncols() != self.config.in_size {
            return Err(LayerError::ShapeMismatch(format!(
                "input batch has {} columns, expected in_size {}",
                v.ncols(),
                self.config.in_size
            )));
        }
        if m.dim() != self.w.dim() {
            return Err(LayerError::ShapeMismatch(format!(
                "bracket operand is {:?}, expected {:?}",
                m.dim(),
                self.w.dim()
            )));
        }
        Ok(v.dot(&(m * &self.metric_tensor())))
    }

    /// Generalized inner product between two matrices, per hidden unit.
    ///
    /// # Algorithm
    /// ```text
    /// matrix_bracket(M1, M2)[j] = Σ_i M1[i, j] · M2[i, j] · |W[i, j]|^(p-2)
    /// ```
    ///
    /// # Errors
    /// `ShapeMismatch` if either operand does not match the weight matrix shape.
    pub fn matrix_bracket(&self, m1: &Array2<f32>, m2: &Array2<f32>) -> LayerResult<Array1<f32>> {
        if m1.dim() != self.w.dim() || m2.dim() != self.w.dim() {
            return Err(LayerError::ShapeMismatch(format!(
                "matrix_bracket operands are {:?} and {:?}, expected {:?}",
                m1.dim(),
                m2.dim(),
                self.w.dim()
            )));
        }
        Ok(((m1 * &self.metric_tensor()) * m2).sum_axis(Axis(0)))
    }

    /// Bracket-norm of every hidden unit's weight column.
    ///
    /// ```text
    /// norm[j] = (Σ_i |W[i, j]|^p)^(1/p)
    /// ```
    pub fn unit_norms(&self) -> Array1<f32> {
        let p = self.config.p;
        self.w
            .mapv(|w| w.abs().powf(p))
            .sum_axis(Axis(0))
            .mapv(|s| s.powf(1.0 / p))
    }

    /// Overlap of a single sample with the current weights, `h = <v, W>`.
    fn sample_overlap(&self, v: ArrayView1<f32>) -> Array1<f32> {
        (&self.w * &self.metric_tensor()).t().dot(&v)
    }
}

/// Capability interface of a local-learning unit.
///
/// The two update-rule variants (and anything wrapping them, such as a
/// classifier's hidden layer) sit behind this trait; the concrete variant is
/// chosen once at construction time.
pub trait Learner {
    /// The layer's weights and parameters.
    fn layer(&self) -> &LocalLayer;

    /// Mutable access to the layer, for snapshot restore and inspection.
    fn layer_mut(&mut self) -> &mut LocalLayer;

    /// Stable name of the update rule, used to reconstruct snapshots.
    fn rule_name(&self) -> &'static str;

    /// Apply one weight update for `batch` with an explicit time constant.
    ///
    /// An empty batch is a strict no-op. The layer's own `tau_l` is not
    /// consulted; the training driver passes `1/lr(epoch)` here so the
    /// configuration stays immutable.
    ///
    /// # Errors
    /// `ShapeMismatch` if the batch is not `(batch_size, in_size)`.
    fn train_step_at(&mut self, batch: &Array2<f32>, tau_l: f32) -> LayerResult<()>;

    /// Apply one weight update using the configured `tau_l`.
    fn train_step(&mut self, batch: &Array2<f32>) -> LayerResult<()> {
        let tau_l = self.layer().config.tau_l;
        self.train_step_at(batch, tau_l)
    }

    /// Forward pass: overlap scores of a batch, `(batch, hidden_size)`.
    ///
    /// # Errors
    /// `ShapeMismatch` if the batch is not `(batch_size, in_size)`.
    fn infer(&self, v: &Array2<f32>) -> LayerResult<Array2<f32>> {
        let layer = self.layer();
        layer.bracket(v, &layer.w)
    }
}

/// Exact sequential update rule.
///
/// Samples are processed one at a time; each weight update is applied
/// immediately, so later samples in the same batch see the mutated weights.
/// The competitive activation is evaluated on normalized overlaps
/// `h / matrix_bracket(W, W)^((p-1)/p)` and inhibits all of ranks 2..k.
#[derive(Debug, Clone)]
pub struct SequentialLearner {
    pub layer: LocalLayer,
}

impl SequentialLearner {
    /// Create a learner with default Gaussian initialization.
    pub fn new(config: LayerConfig) -> LayerResult<Self> {
        Ok(Self {
            layer: LocalLayer::new(config)?,
        })
    }

    /// Create a learner with explicit initialization scale and seed.
    pub fn with_init(config: LayerConfig, sigma: Option<f32>, seed: Option<u64>) -> LayerResult<Self> {
        Ok(Self {
            layer: LocalLayer::with_init(config, sigma, seed)?,
        })
    }

    /// Wrap an existing layer.
    pub fn from_layer(layer: LocalLayer) -> Self {
        Self { layer }
    }
}

impl Learner for SequentialLearner {
    fn layer(&self) -> &LocalLayer {
        &self.layer
    }

    fn layer_mut(&mut self) -> &mut LocalLayer {
        &mut self.layer
    }

    fn rule_name(&self) -> &'static str {
        "sequential"
    }

    /// # Algorithm
    ///
    /// For each sample `v` in batch order:
    /// ```text
    /// h = <v, W>
    /// Q = matrix_bracket(W, W)^((p-1)/p)
    /// a = g_sequential(h / Q)
    /// W[:,j] += a_j · (R^p · v − h_j · W[:,j]) / tau_l    for all j
    /// ```
    /// The increment only touches the k columns with nonzero activation.
    fn train_step_at(&mut self, batch: &Array2<f32>, tau_l: f32) -> LayerResult<()> {
        if batch.nrows() == 0 {
            return Ok(());
        }
        if batch.ncols() != self.layer.config.in_size {
            return Err(LayerError::ShapeMismatch(format!(
                "input batch has {} columns, expected in_size {}",
                batch.ncols(),
                self.layer.config.in_size
            )));
        }

        let cfg = self.layer.config.clone();
        let r_p = cfg.radius.powf(cfg.p);
        let q_exp = (cfg.p - 1.0) / cfg.p;

        for v in batch.rows() {
            // Overlaps and normalization against the weights as they stand
            // before this sample's update.
            let h = self.layer.sample_overlap(v);
            let q_norm = self
                .layer
                .matrix_bracket(&self.layer.w, &self.layer.w)?
                .mapv(|x| x.powf(q_exp));
            let q = &h / &q_norm;
            let g = g_sequential(&q, cfg.k, cfg.delta);

            for (j, &g_j) in g.iter().enumerate() {
                if g_j == 0.0 {
                    continue;
                }
                let h_j = h[j];
                let mut col = self.layer.w.column_mut(j);
                for (w_ij, &v_i) in col.iter_mut().zip(v.iter()) {
                    *w_ij += g_j * (r_p * v_i - h_j * *w_ij) / tau_l;
                }
            }
        }
        Ok(())
    }
}

/// Fast batched update rule.
///
/// The whole minibatch is folded into a single closed-form increment; no
/// per-sample weight mutation happens, so the result approximates (but for
/// batches larger than one does not exactly reproduce) the sequential rule.
/// The competitive activation runs on raw overlaps and inhibits only the
/// anti-winner, and the increment is normalized by its largest absolute
/// entry before application.
#[derive(Debug, Clone)]
pub struct FastLearner {
    pub layer: LocalLayer,
    /// Precision floor for the increment normalization.
    pub prec: f32,
}

impl FastLearner {
    /// Create a learner with default Gaussian initialization.
    pub fn new(config: LayerConfig) -> LayerResult<Self> {
        Ok(Self {
            layer: LocalLayer::new(config)?,
            prec: DEFAULT_PREC,
        })
    }

    /// Create a learner with explicit initialization scale and seed.
    pub fn with_init(config: LayerConfig, sigma: Option<f32>, seed: Option<u64>) -> LayerResult<Self> {
        Ok(Self {
            layer: LocalLayer::with_init(config, sigma, seed)?,
            prec: DEFAULT_PREC,
        })
    }

    /// Wrap an existing layer.
    pub fn from_layer(layer: LocalLayer) -> Self {
        Self {
            layer,
            prec: DEFAULT_PREC,
        }
    }
}

impl Learner for FastLearner {
    fn layer(&self) -> &LocalLayer {
        &self.layer
    }

    fn layer_mut(&mut self) -> &mut LocalLayer {
        &mut self.layer
    }

    fn rule_name(&self) -> &'static str {
        "fast"
    }

    /// # Algorithm
    ///
    /// ```text
    /// H = <V, W>                                   (batch, hidden)
    /// A = g_fast(H)                                per row
    /// inc = R^p · (Vᵀ A) − (Σ_b A ⊙ H) ⊙ W
    /// W += inc / (max(max|inc|, prec) · tau_l)
    /// ```
    /// The precision floor keeps an all-zero increment from dividing by zero;
    /// such a batch leaves the weights unchanged and finite.
    fn train_step_at(&mut self, batch: &Array2<f32>, tau_l: f32) -> LayerResult<()> {
        if batch.nrows() == 0 {
            return Ok(());
        }
        if batch.ncols() != self.layer.config.in_size {
            return Err(LayerError::ShapeMismatch(format!(
                "input batch has {} columns, expected in_size {}",
                batch.ncols(),
                self.layer.config.in_size
            )));
        }

        let cfg = &self.layer.config;
        let r_p = cfg.radius.powf(cfg.p);

        let h = self.layer.bracket(batch, &self.layer.w)?;
        let a = g_fast(&h, cfg.k, cfg.delta);

        // drive[j] = Σ_b A[b, j] · H[b, j]
        let drive = (&a * &h).sum_axis(Axis(0));
        let mut inc = batch.t().dot(&a) * r_p;
        inc -= &(&self.layer.w * &drive);

        let nc = inc
            .iter()
            .fold(0.0f32, |m, x| m.max(x.abs()))
            .max(self.prec);
        self.layer.w.scaled_add(1.0 / (nc * tau_l), &inc);
        Ok(())
    }
}
