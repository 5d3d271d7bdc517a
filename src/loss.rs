use std::fmt::{Display, Formatter};

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::Criterion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
    ///Mean Squared Error against one-hot targets,
    /// defined per row as `0.5*sum(y_true - y_pred)^2`,
    /// with the derivative being `(y_pred - y_true)`.
    MSE,
    ///Applies Softmax to the logits, then multi-class cross-entropy.
    /// The derivative wrt to logits is `softmax - y_true`
    SoftmaxAndCrossEntropy,
}

impl Loss {
    /// per row loss, before averaging
    pub fn row_losses(&self, outputs: &Array2<f32>, targets: &[usize]) -> Vec<f32> {
        match self {
            Loss::MSE => outputs
                .rows()
                .into_iter()
                .zip(targets)
                .map(|(row, &t)| {
                    row.iter()
                        .enumerate()
                        .map(|(j, &a)| {
                            let target = if j == t { 1. } else { 0. };
                            0.5 * (target - a).powi(2)
                        })
                        .sum::<f32>()
                })
                .collect(),
            Loss::SoftmaxAndCrossEntropy => outputs
                .rows()
                .into_iter()
                .zip(targets)
                .map(|(row, &t)| {
                    //log-sum-exp keeps large logits finite
                    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    let lse = row.iter().map(|&z| (z - max).exp()).sum::<f32>().ln() + max;
                    lse - row[t]
                })
                .collect(),
        }
    }
}

impl Criterion for Loss {
    fn loss(&self, output: &Array2<f32>, targets: &[usize]) -> f32 {
        let losses = self.row_losses(output, targets);
        losses.iter().sum::<f32>() / losses.len().max(1) as f32
    }

    fn gradient(&self, output: &Array2<f32>, targets: &[usize]) -> Array2<f32> {
        let count = output.nrows().max(1) as f32;
        let mut grad = match self {
            Loss::MSE => output.clone(),
            Loss::SoftmaxAndCrossEntropy => softmax(output),
        };
        for (mut row, &t) in grad.rows_mut().into_iter().zip(targets) {
            row[t] -= 1.;
        }
        grad.mapv_inplace(|g| g / count);
        grad
    }
}

/// Row-wise softmax
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|z| (z - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|e| e / sum);
    }
    out
}

/// Checks targets line up with output rows and index a valid class
pub fn check_targets(output_rows: usize, classes: usize, targets: &[usize]) -> Result<()> {
    if targets.len() != output_rows {
        return Err(Error::Shape(format!(
            "{} targets for {} rows",
            targets.len(),
            output_rows
        )));
    }
    if let Some(bad) = targets.iter().find(|&&t| t >= classes) {
        return Err(Error::Shape(format!(
            "target {bad} out of range for {classes} outputs"
        )));
    }
    Ok(())
}

impl Display for Loss {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Loss::MSE => write!(f, "Mean Squared Error"),
            Loss::SoftmaxAndCrossEntropy => write!(f, "Softmax and Cross-Entropy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn cross_entropy_uniform() {
        let out = Array2::zeros((2, 3));
        let loss = Loss::SoftmaxAndCrossEntropy.loss(&out, &[0, 2]);
        assert!((loss - 3f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn cross_entropy_gradient() {
        let out = Array2::zeros((1, 3));
        let grad = Loss::SoftmaxAndCrossEntropy.gradient(&out, &[0]);
        let third = 1f32 / 3.;
        let expected = arr2(&[[third - 1., third, third]]);
        assert!(grad
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| (a - b).abs() < 1e-6));
    }

    #[test]
    fn gradient_is_averaged_over_rows() {
        let out = Array2::zeros((2, 2));
        let grad = Loss::MSE.gradient(&out, &[0, 1]);
        assert_eq!(grad, arr2(&[[-0.5f32, 0.], [0., -0.5]]));
    }

    #[test]
    fn mse_against_one_hot() {
        let out = arr2(&[[1f32, 0.], [0., 0.]]);
        let loss = Loss::MSE.loss(&out, &[0, 1]);
        //row0: 0, row1: 0.5
        assert!((loss - 0.25).abs() < 1e-6);
    }

    #[test]
    fn large_logits_stay_finite() {
        let out = arr2(&[[1000f32, -1000.]]);
        let loss = Loss::SoftmaxAndCrossEntropy.loss(&out, &[1]);
        assert!((loss - 2000.).abs() < 1e-2);
        let sm = softmax(&out);
        assert!(sm.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn target_checks() {
        assert!(check_targets(2, 3, &[0, 2]).is_ok());
        assert!(check_targets(2, 3, &[0]).is_err());
        assert!(check_targets(1, 3, &[3]).is_err());
    }
}
