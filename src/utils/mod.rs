//! Math helpers shared by the classifier head.

use ndarray::{Array2, ArrayView1};

/// Power-law rectified activation: `max(x, 0)^n`.
#[inline]
pub fn relu_pow(x: f32, n: f32) -> f32 {
    if x > 0.0 {
        x.powf(n)
    } else {
        0.0
    }
}

/// Row-wise softmax, shifted by the row maximum for numerical stability.
pub fn row_softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|x| x / sum);
        }
    }
    out
}

/// Index of the largest entry; ties resolve to the lowest index.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_relu_pow() {
        assert_eq!(relu_pow(2.0, 2.0), 4.0);
        assert_eq!(relu_pow(-2.0, 2.0), 0.0);
        assert_eq!(relu_pow(0.0, 4.5), 0.0);
    }

    #[test]
    fn test_row_softmax_sums_to_one() {
        let logits = array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]];
        let probs = row_softmax(&logits);
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!(probs[[0, 2]] > probs[[0, 0]]);
    }

    #[test]
    fn test_argmax_tie_breaks_low() {
        let row = array![0.5, 0.9, 0.9];
        assert_eq!(argmax(row.view()), 1);
    }

}
