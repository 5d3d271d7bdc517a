use ndarray::Array1;

/// Inverted dropout for one layer's outputs
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Dropout {
    rate: f32,
    values: Array1<f32>,
}
impl Dropout {
    pub(crate) fn new(rate: f32, size: usize) -> Self {
        assert!(rate > 0. && rate < 1., "Dropout rate must be in range (0,1)");
        Self {
            rate,
            values: Array1::ones(size),
        }
    }
    pub(crate) fn recalc(&mut self) {
        self.values.mapv_inplace(|_|
                //keep with prob 1-dropout
                if fastrand::f32() < self.rate {
                    0.
                } else {
                    1. / (1. - self.rate) //scale up to keep expected value the same
                });
    }
    pub(crate) fn mask(&self) -> &Array1<f32> {
        &self.values
    }
    pub(crate) fn rate(&self) -> f32 {
        self.rate
    }
}
