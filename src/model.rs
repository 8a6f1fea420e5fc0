//! Supervised classifier head on top of a trained local-learning layer.
//!
//! Architecture:
//! ```text
//! Learner (frozen competitive layer)
//!       |
//! relu(h)^n  (power-law latent activation)
//!       |
//! Dense (linear readout)
//! ```
//!
//! Only the dense readout is trained, with an ordinary hand-derived
//! softmax-cross-entropy gradient; the hidden layer stays frozen. Raw-logit
//! and predicted-class inference are two distinct named operations rather
//! than a runtime mode switch.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::{LayerError, LayerResult, Learner};
use crate::utils::{argmax, relu_pow, row_softmax};

/// Head-training configuration.
#[derive(Debug, Clone)]
pub struct HeadConfig {
    pub epochs: usize,
    pub lr: f32,
    pub batch_size: usize,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            lr: 0.01,
            batch_size: 64,
        }
    }
}

/// Classifier: frozen hidden layer, power-law latent, dense readout.
pub struct Classifier {
    /// Trained competitive layer producing hidden overlaps.
    pub hidden: Box<dyn Learner>,
    /// Readout weights, shape `(hidden_size, num_classes)`.
    pub dense_w: Array2<f32>,
    /// Readout biases.
    pub dense_b: Array1<f32>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("rule", &self.hidden.rule_name())
            .field("hidden_size", &self.hidden.layer().config.hidden_size)
            .field("num_classes", &self.dense_w.ncols())
            .finish()
    }
}

impl Classifier {
    /// Build a classifier over an already-trained layer.
    ///
    /// The readout is initialized uniformly in `±1/sqrt(hidden_size)`.
    ///
    /// # Errors
    /// `InvalidConfig` if `num_classes < 2`.
    pub fn new(hidden: Box<dyn Learner>, num_classes: usize, seed: Option<u64>) -> LayerResult<Self> {
        if num_classes < 2 {
            return Err(LayerError::InvalidConfig(format!(
                "need at least 2 classes, got {num_classes}"
            )));
        }
        let hidden_size = hidden.layer().config.hidden_size;
        let limit = 1.0 / (hidden_size as f32).sqrt();
        let dist = Uniform::new(-limit, limit);
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let dense_w = Array2::random_using((hidden_size, num_classes), dist, &mut rng);
        Ok(Self {
            hidden,
            dense_w,
            dense_b: Array1::zeros(num_classes),
        })
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.dense_w.ncols()
    }

    /// Latent activation: `relu(h)^n` elementwise.
    fn latent(&self, hidden: &Array2<f32>) -> Array2<f32> {
        let n = self.hidden.layer().config.n;
        hidden.mapv(|h| relu_pow(h, n))
    }

    /// Raw-logit inference.
    ///
    /// Returns `(logits, hidden)` where logits have shape
    /// `(batch, num_classes)` and hidden the raw overlap scores.
    ///
    /// # Errors
    /// `ShapeMismatch` if the batch width is not the layer's `in_size`.
    pub fn infer_logits(&self, x: &Array2<f32>) -> LayerResult<(Array2<f32>, Array2<f32>)> {
        let hidden = self.hidden.infer(x)?;
        let logits = self.latent(&hidden).dot(&self.dense_w) + &self.dense_b;
        Ok((logits, hidden))
    }

    /// Predicted-class inference.
    ///
    /// Returns `(classes, hidden)`; the class of each sample is the argmax of
    /// its logits.
    ///
    /// # Errors
    /// `ShapeMismatch` if the batch width is not the layer's `in_size`.
    pub fn infer_class(&self, x: &Array2<f32>) -> LayerResult<(Vec<usize>, Array2<f32>)> {
        let (logits, hidden) = self.infer_logits(x)?;
        let classes = logits.rows().into_iter().map(argmax).collect();
        Ok((classes, hidden))
    }

    /// Train the dense readout with softmax cross-entropy SGD.
    ///
    /// # Algorithm
    ///
    /// Per minibatch of size B:
    /// ```text
    /// a = relu(<x, W>)^n
    /// P = softmax(a · D + b)
    /// G = (P − onehot(labels)) / B
    /// D -= lr · aᵀ G
    /// b -= lr · Σ_b G
    /// ```
    /// The hidden layer is never touched.
    ///
    /// Returns the mean cross-entropy loss per epoch.
    ///
    /// # Errors
    /// `ShapeMismatch` on batch-width or label-count mismatch,
    /// `InvalidConfig` for labels outside `0..num_classes`.
    pub fn fit_head(
        &mut self,
        x: &Array2<f32>,
        labels: &[u8],
        config: &HeadConfig,
    ) -> LayerResult<Vec<f32>> {
        if labels.len() != x.nrows() {
            return Err(LayerError::ShapeMismatch(format!(
                "{} labels for {} samples",
                labels.len(),
                x.nrows()
            )));
        }
        let num_classes = self.num_classes();
        if labels.iter().any(|&l| usize::from(l) >= num_classes) {
            return Err(LayerError::InvalidConfig(format!(
                "label out of range for {num_classes} classes"
            )));
        }
        if x.nrows() == 0 {
            return Ok(vec![0.0; config.epochs]);
        }

        let batch_size = config.batch_size.max(1);
        let mut epoch_losses = Vec::with_capacity(config.epochs);

        for _ in 0..config.epochs {
            let mut loss_sum = 0.0f32;
            let mut count = 0usize;

            for start in (0..x.nrows()).step_by(batch_size) {
                let end = (start + batch_size).min(x.nrows());
                let xb = x.slice(ndarray::s![start..end, ..]).to_owned();
                let lb = &labels[start..end];
                let b = xb.nrows() as f32;

                let hidden = self.hidden.infer(&xb)?;
                let latent = self.latent(&hidden);
                let logits = latent.dot(&self.dense_w) + &self.dense_b;
                let probs = row_softmax(&logits);

                for (row, &label) in probs.rows().into_iter().zip(lb.iter()) {
                    loss_sum += -(row[usize::from(label)].max(1e-12)).ln();
                    count += 1;
                }

                // G = (P − onehot) / B
                let mut grad = probs;
                for (mut row, &label) in grad.rows_mut().into_iter().zip(lb.iter()) {
                    row[usize::from(label)] -= 1.0;
                }
                grad.mapv_inplace(|g| g / b);

                self.dense_w.scaled_add(-config.lr, &latent.t().dot(&grad));
                self.dense_b.scaled_add(-config.lr, &grad.sum_axis(Axis(0)));
            }

            epoch_losses.push(loss_sum / count as f32);
        }
        Ok(epoch_losses)
    }

    /// Classification accuracy over a labeled set.
    ///
    /// # Errors
    /// `ShapeMismatch` on batch-width or label-count mismatch.
    pub fn evaluate(&self, x: &Array2<f32>, labels: &[u8]) -> LayerResult<f32> {
        if labels.len() != x.nrows() {
            return Err(LayerError::ShapeMismatch(format!(
                "{} labels for {} samples",
                labels.len(),
                x.nrows()
            )));
        }
        if labels.is_empty() {
            return Ok(0.0);
        }
        let (classes, _) = self.infer_class(x)?;
        let correct = classes
            .iter()
            .zip(labels.iter())
            .filter(|(&c, &l)| c == usize::from(l))
            .count();
        Ok(correct as f32 / labels.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FastLearner, LocalLayer};
    use crate::LayerConfig;
    use ndarray::array;

    /// Identity hidden layer: p = 2 with the unit matrix passes inputs through.
    fn identity_learner() -> FastLearner {
        let cfg = LayerConfig {
            in_size: 2,
            hidden_size: 2,
            n: 1.0,
            p: 2.0,
            tau_l: 25.0,
            k: 1,
            delta: 0.4,
            radius: 1.0,
        };
        let w = array![[1.0, 0.0], [0.0, 1.0]];
        FastLearner::from_layer(LocalLayer::from_weights(cfg, w).unwrap())
    }

    fn separable_data() -> (Array2<f32>, Vec<u8>) {
        let x = array![
            [1.0, 0.1],
            [0.9, 0.2],
            [1.1, 0.0],
            [0.8, 0.1],
            [0.1, 1.0],
            [0.2, 0.9],
            [0.0, 1.1],
            [0.1, 0.8],
        ];
        (x, vec![0, 0, 0, 0, 1, 1, 1, 1])
    }

    #[test]
    fn test_head_learns_separable_problem() {
        let mut clf = Classifier::new(Box::new(identity_learner()), 2, Some(3)).unwrap();
        let (x, labels) = separable_data();
        let config = HeadConfig {
            epochs: 200,
            lr: 0.5,
            batch_size: 8,
        };

        let losses = clf.fit_head(&x, &labels, &config).unwrap();
        assert!(losses[losses.len() - 1] < losses[0]);

        let accuracy = clf.evaluate(&x, &labels).unwrap();
        assert!((accuracy - 1.0).abs() < 1e-6, "accuracy {accuracy}");
    }

    #[test]
    fn test_infer_logits_and_class_agree() {
        let clf = Classifier::new(Box::new(identity_learner()), 2, Some(5)).unwrap();
        let (x, _) = separable_data();

        let (logits, hidden_a) = clf.infer_logits(&x).unwrap();
        let (classes, hidden_b) = clf.infer_class(&x).unwrap();

        assert_eq!(hidden_a, hidden_b);
        for (row, &class) in logits.rows().into_iter().zip(classes.iter()) {
            assert_eq!(argmax(row), class);
        }
    }

    #[test]
    fn test_label_out_of_range_rejected() {
        let mut clf = Classifier::new(Box::new(identity_learner()), 2, Some(5)).unwrap();
        let (x, _) = separable_data();
        let bad_labels = vec![0, 0, 0, 0, 1, 1, 1, 9];
        assert!(clf.fit_head(&x, &bad_labels, &HeadConfig::default()).is_err());
    }

    #[test]
    fn test_single_class_rejected() {
        assert!(Classifier::new(Box::new(identity_learner()), 1, None).is_err());
    }
}
