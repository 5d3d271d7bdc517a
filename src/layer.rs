use std::fmt::Display;

use ndarray::{Array2, Axis};

use crate::{
    activation::Activation,
    dropout::Dropout,
    initialization::{calc_initialization, Initialization},
};

/// Fully connected layer, `weights` is `[inputs x outputs]` and `bias` is `[1 x outputs]`
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub(crate) weights: Array2<f32>,
    pub(crate) bias: Array2<f32>,
    pub(crate) weight_grad: Array2<f32>,
    pub(crate) bias_grad: Array2<f32>,
    pub(crate) initialization: Initialization,
    pub(crate) activation: Activation,
    pub(crate) dropout: Option<Dropout>,
}

/// Pre-activation and output of one layer for a batch
#[derive(Debug, Clone)]
pub(crate) struct LayerOutput {
    pub(crate) pre: Array2<f32>,
    pub(crate) activated: Array2<f32>,
}

impl Dense {
    pub(crate) fn new(inputs: usize, outputs: usize, builder: &DenseBuilder) -> Self {
        let mut layer = Self {
            weights: Array2::zeros((inputs, outputs)),
            bias: Array2::zeros((1, outputs)),
            weight_grad: Array2::zeros((inputs, outputs)),
            bias_grad: Array2::zeros((1, outputs)),
            initialization: builder.initialization,
            activation: builder.activation,
            dropout: builder.dropout.map(|rate| Dropout::new(rate, outputs)),
        };
        layer.reinitialize();
        layer
    }

    /// bias starts at zero unless the initialization is fixed
    pub(crate) fn reinitialize(&mut self) {
        let (inputs, outputs) = self.weights.dim();
        let init = self.initialization;
        self.weights
            .mapv_inplace(|_| calc_initialization(init, inputs, outputs));
        let bias = match init {
            Initialization::Fixed(v) => v,
            _ => 0.,
        };
        self.bias.fill(bias);
    }

    pub(crate) fn zero_grad(&mut self) {
        self.weight_grad.fill(0.);
        self.bias_grad.fill(0.);
    }

    /// dropout mask only while training
    fn active_mask(&self, training: bool) -> Option<&Dropout> {
        self.dropout.as_ref().filter(|_| training)
    }

    pub(crate) fn forward(&self, input: &Array2<f32>, training: bool) -> LayerOutput {
        let pre = input.dot(&self.weights) + &self.bias;
        let mut activated = self.activation.apply_all(&pre);
        if let Some(d) = self.active_mask(training) {
            activated *= d.mask();
        }
        LayerOutput { pre, activated }
    }

    /// Adds this batch's gradients given dE/da of the output,
    /// returns dE/da of the input for the layer below
    pub(crate) fn accumulate(
        &mut self,
        input: &Array2<f32>,
        pre: &Array2<f32>,
        output_gradient: Array2<f32>,
        training: bool,
    ) -> Array2<f32> {
        let mut dadz = self.activation.derivative_all(pre);
        if let Some(d) = self.active_mask(training) {
            dadz *= d.mask();
        }
        let delta = output_gradient * &dadz;
        self.weight_grad += &input.t().dot(&delta);
        self.bias_grad += &delta.sum_axis(Axis(0)).insert_axis(Axis(0));
        delta.dot(&self.weights.t())
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }
}

impl Display for Dense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dense {} -> {} {} ({})",
            self.inputs(),
            self.outputs(),
            self.activation,
            self.initialization,
        )?;
        if let Some(d) = &self.dropout {
            write!(f, " dropout {}", d.rate())?;
        }
        Ok(())
    }
}

/// Layer settings collected before the input size is known
#[derive(Clone, Debug)]
pub struct DenseBuilder {
    pub(crate) size: usize,
    pub(crate) initialization: Initialization,
    pub(crate) activation: Activation,
    pub(crate) dropout: Option<f32>,
}

impl From<usize> for DenseBuilder {
    fn from(size: usize) -> Self {
        dense(size)
    }
}

/// Relu layer of `size` outputs with Xavier weights
pub fn dense(size: usize) -> DenseBuilder {
    DenseBuilder {
        size,
        initialization: Initialization::Xavier,
        activation: Activation::Relu,
        dropout: None,
    }
}

impl DenseBuilder {
    pub fn initializer(mut self, initialization: Initialization) -> Self {
        self.initialization = initialization;
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Dropout rate in range (0,1), 0.2 is a good start
    pub fn dropout(mut self, rate: f32) -> Self {
        assert!(rate > 0. && rate < 1., "Dropout rate must be in range (0,1)");
        self.dropout = Some(rate);
        self
    }

    pub(crate) fn build(&self, input: usize) -> Dense {
        Dense::new(input, self.size, self)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn fixed_initialization_fills_bias() {
        let layer = dense(3).initializer(Initialization::Fixed(0.5)).build(2);
        assert_eq!(layer.weights.dim(), (2, 3));
        assert!(layer.weights.iter().all(|&w| w == 0.5));
        assert!(layer.bias.iter().all(|&b| b == 0.5));

        let layer = dense(3).build(2);
        assert!(layer.bias.iter().all(|&b| b == 0.));
    }

    #[test]
    fn forward_then_accumulate() {
        let mut layer = dense(1)
            .activation(Activation::Linear)
            .initializer(Initialization::Fixed(1.))
            .build(2);
        let x = arr2(&[[1f32, 2.], [3., 4.]]);
        let out = layer.forward(&x, true);
        assert_eq!(out.activated, arr2(&[[4f32], [8.]]));

        let passed = layer.accumulate(&x, &out.pre, arr2(&[[1f32], [1.]]), true);
        assert_eq!(layer.weight_grad, arr2(&[[4f32], [6.]]));
        assert_eq!(layer.bias_grad, arr2(&[[2f32]]));
        assert_eq!(passed, arr2(&[[1f32, 1.], [1., 1.]]));

        layer.zero_grad();
        assert!(layer.weight_grad.iter().all(|&g| g == 0.));
    }

    #[test]
    fn display() {
        let layer = dense(4).dropout(0.2).build(3);
        assert_eq!(layer.to_string(), "dense 3 -> 4 Relu (Xavier) dropout 0.2");
    }
}
