use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array, Array1, Array2, Axis, Dimension};

use crate::error::{Error, Result};

/// Z-score per feature with statistics from the data it was fit on.
/// Uses the population standard deviation, zero variance features get a scale of 1
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f32>,
    scale: Array1<f32>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f32>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(Error::Transform("cannot fit scaler on no samples".into()));
        }
        let n = x.nrows() as f64;
        let mut mean = Array1::zeros(x.ncols());
        let mut scale = Array1::ones(x.ncols());
        for (j, col) in x.axis_iter(Axis(1)).enumerate() {
            let m = col.iter().map(|&v| v as f64).sum::<f64>() / n;
            let var = col.iter().map(|&v| (v as f64 - m).powi(2)).sum::<f64>() / n;
            mean[j] = m as f32;
            if var > 0. {
                scale[j] = var.sqrt() as f32;
            }
        }
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_width(x)?;
        Ok((x - &self.mean) / &self.scale)
    }

    pub fn inverse_transform(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_width(x)?;
        Ok(x * &self.scale + &self.mean)
    }

    pub fn mean(&self) -> &Array1<f32> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f32> {
        &self.scale
    }

    fn check_width(&self, x: &Array2<f32>) -> Result<()> {
        if x.ncols() != self.mean.len() {
            return Err(Error::Transform(format!(
                "scaler fit on {} features, got {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        Ok(())
    }
}

/// Linear projection onto the directions of largest variance.
///
/// Components come from the eigendecomposition of the sample covariance (ddof 1)
/// and are ordered by decreasing explained variance. Each component's sign is
/// flipped so its largest magnitude loading is positive.
#[derive(Debug, Clone, PartialEq)]
pub struct Pca {
    mean: Array1<f64>,
    /// `n_components x n_features`
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    total_variance: f64,
    whiten: bool,
}

impl Pca {
    pub fn fit(x: &Array2<f32>, n_components: usize, whiten: bool) -> Result<Self> {
        let (n, d) = x.dim();
        if n < 2 {
            return Err(Error::Transform(format!(
                "pca needs at least 2 samples, got {n}"
            )));
        }
        if n_components == 0 || n_components > n.min(d) {
            return Err(Error::Transform(format!(
                "n_components must be in 1..={}, got {n_components}",
                n.min(d)
            )));
        }

        let x = x.mapv(|v| v as f64);
        let mean = x.sum_axis(Axis(0)) / n as f64;
        let centered = DMatrix::from_fn(n, d, |i, j| x[[i, j]] - mean[j]);
        let covariance = (centered.transpose() * &centered) / (n as f64 - 1.);

        let eigen = SymmetricEigen::new(covariance);
        let total_variance = eigen.eigenvalues.iter().map(|v| v.max(0.)).sum::<f64>();

        // nalgebra doesn't guarantee order
        let mut order: Vec<(usize, f64)> = eigen.eigenvalues.iter().copied().enumerate().collect();
        order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut components = Array2::zeros((n_components, d));
        let mut explained_variance = Array1::zeros(n_components);
        for (k, &(idx, lambda)) in order.iter().take(n_components).enumerate() {
            let vector = eigen.eigenvectors.column(idx);
            let largest = vector
                .iter()
                .copied()
                .fold(0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
            let sign = if largest < 0. { -1. } else { 1. };
            for j in 0..d {
                components[[k, j]] = vector[j] * sign;
            }
            explained_variance[k] = lambda.max(0.);
        }

        Ok(Self {
            mean,
            components,
            explained_variance,
            total_variance,
            whiten,
        })
    }

    pub fn transform(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.mean.len() {
            return Err(Error::Transform(format!(
                "pca fit on {} features, got {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        let centered = x.mapv(|v| v as f64) - &self.mean;
        let mut projected = centered.dot(&self.components.t());
        if self.whiten {
            for (mut col, &var) in projected
                .axis_iter_mut(Axis(1))
                .zip(&self.explained_variance)
            {
                let std = var.sqrt();
                if std > 1e-12 {
                    col.mapv_inplace(|v| v / std);
                }
            }
        }
        Ok(projected.mapv(|v| v as f32))
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    pub fn explained_variance_ratio(&self) -> Array1<f64> {
        if self.total_variance > 0. {
            &self.explained_variance / self.total_variance
        } else {
            Array1::zeros(self.explained_variance.len())
        }
    }
}

/// Flattens everything after the sample axis, e.g. `(n, 1, D)` to `(n, D)`
pub fn to_rows<D: Dimension>(x: &Array<f32, D>) -> Result<Array2<f32>> {
    let shape = x.shape();
    let Some((&n, rest)) = shape.split_first() else {
        return Err(Error::Transform("cannot take rows of a scalar".into()));
    };
    let width = rest.iter().product::<usize>();
    Array2::from_shape_vec((n, width), x.iter().copied().collect())
        .map_err(|e| Error::Transform(e.to_string()))
}

/// Scales train and test with statistics from train only
pub fn feature_scaler<D: Dimension>(
    train: &Array<f32, D>,
    test: &Array<f32, D>,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let train = to_rows(train)?;
    let test = to_rows(test)?;
    let scaler = StandardScaler::fit(&train)?;
    Ok((scaler.transform(&train)?, scaler.transform(&test)?))
}

/// Whitened PCA down to `new_d` features, fit on train only
pub fn feature_reduction(
    train: &Array2<f32>,
    test: &Array2<f32>,
    new_d: usize,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let pca = Pca::fit(train, new_d, true)?;
    Ok((pca.transform(train)?, pca.transform(test)?))
}

#[cfg(test)]
mod tests {
    use ndarray::{arr2, Array3};

    use super::*;

    fn close(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn scaler_zero_mean_unit_variance() {
        let x = arr2(&[[1f32, 10.], [2., 10.], [3., 10.], [4., 10.]]);
        let s = StandardScaler::fit(&x).unwrap();
        let t = s.transform(&x).unwrap();
        let col = t.column(0);
        let mean = col.sum() / 4.;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.;
        assert!(close(mean, 0., 1e-6));
        assert!(close(var, 1., 1e-5));
        //constant column keeps scale 1
        assert_eq!(s.scale()[1], 1.);
        assert!(t.column(1).iter().all(|&v| v == 0.));
    }

    #[test]
    fn scaler_uses_train_statistics() {
        let train = arr2(&[[0f32], [2.]]);
        let test = arr2(&[[4f32]]);
        let (_, t) = feature_scaler(&train, &test).unwrap();
        // mean 1, std 1
        assert!(close(t[[0, 0]], 3., 1e-6));
    }

    #[test]
    fn scaler_inverse_round_trip() {
        let x = arr2(&[[1f32, -3.], [5., 7.], [2., 0.5]]);
        let s = StandardScaler::fit(&x).unwrap();
        let back = s.inverse_transform(&s.transform(&x).unwrap()).unwrap();
        assert!(back.iter().zip(x.iter()).all(|(a, b)| close(*a, *b, 1e-5)));
    }

    #[test]
    fn scaler_errors() {
        assert!(StandardScaler::fit(&Array2::zeros((0, 3))).is_err());
        let s = StandardScaler::fit(&Array2::ones((2, 3))).unwrap();
        assert!(matches!(
            s.transform(&Array2::ones((2, 2))),
            Err(Error::Transform(_))
        ));
    }

    #[test]
    fn scaler_flattens_channels() {
        let train = Array3::from_shape_fn((4, 1, 3), |(i, _, j)| (i * j) as f32);
        let test = Array3::zeros((2, 1, 3));
        let (a, b) = feature_scaler(&train, &test).unwrap();
        assert_eq!(a.dim(), (4, 3));
        assert_eq!(b.dim(), (2, 3));
    }

    fn line() -> Array2<f32> {
        arr2(&[
            [-2f32, -4.1],
            [-1., -1.9],
            [0., 0.1],
            [1., 2.0],
            [2., 3.9],
        ])
    }

    #[test]
    fn pca_finds_main_direction() {
        let pca = Pca::fit(&line(), 2, false).unwrap();
        let c = pca.components();
        let inv = 1. / 5f64.sqrt();
        assert!((c[[0, 0]] - inv).abs() < 0.02);
        assert!((c[[0, 1]] - 2. * inv).abs() < 0.02);
        // largest loading positive
        let second = c.row(1);
        let largest = second
            .iter()
            .copied()
            .fold(0f64, |a, v| if v.abs() > a.abs() { v } else { a });
        assert!(largest > 0.);

        let ev = pca.explained_variance();
        assert!(ev[0] >= ev[1]);
        assert!(pca.explained_variance_ratio()[0] > 0.99);
    }

    #[test]
    fn whitened_output_has_unit_variance() {
        let x = line();
        let test = arr2(&[[0.5f32, 1.]]);
        let (train, reduced) = feature_reduction(&x, &test, 1).unwrap();
        assert_eq!(train.dim(), (5, 1));
        assert_eq!(reduced.dim(), (1, 1));
        let col = train.column(0);
        let mean = col.sum() / 5.;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.;
        assert!(close(mean, 0., 1e-5));
        assert!(close(var, 1., 1e-4));
    }

    #[test]
    fn pca_errors() {
        assert!(Pca::fit(&line(), 0, true).is_err());
        assert!(Pca::fit(&line(), 3, true).is_err());
        assert!(Pca::fit(&Array2::zeros((1, 3)), 1, true).is_err());
        let pca = Pca::fit(&line(), 1, true).unwrap();
        assert!(matches!(
            pca.transform(&Array2::zeros((1, 3))),
            Err(Error::Transform(_))
        ));
    }
}
