use std::fmt::Display;

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::activation::Activation;
use crate::dropout::Dropout;
use crate::error::{Error, Result};
use crate::initialization::Initialization;
use crate::layer::{dense, Dense, DenseBuilder, LayerOutput};
use crate::loss::check_targets;
use crate::state::StateDict;
use crate::traits::{Criterion, Model};

/// Multi layer perceptron producing logits.
///
/// Hidden layers default to `Relu`, the output layer is `Linear` so the
/// criterion sees raw scores. Starts in training mode.
///
///```rust
///   use seizure_nn::prelude::*;
///   use ndarray::array;
///
///   let mut net = Mlp::new(&[2, 8, 2]).with_activation_hidden(Activation::Tanh);
///   let mut opt = GradientDescent::new(OptimizerType::adam(), 0.05);
///   let x = array![[0., 0.], [0., 1.], [1., 0.], [1., 1.]];
///   let y = [0, 1, 1, 0];
///   for _ in 0..10 {
///       opt.zero_grad(&mut net);
///       net.backward(x.view(), &y, &Loss::SoftmaxAndCrossEntropy).unwrap();
///       opt.step(&mut net);
///   }
///   assert_eq!(net.forward(x.view()).dim(), (4, 2));
///```
#[derive(Debug, Clone)]
pub struct Mlp {
    input_size: usize,
    pub(crate) layers: Vec<Dense>,
    training: bool,
}

/// Values of every layer for one forward pass, `activated[0]` is the input
#[derive(Clone, Debug)]
pub(crate) struct Values {
    pub(crate) pre: Vec<Array2<f32>>,
    pub(crate) activated: Vec<Array2<f32>>,
}

impl Mlp {
    /// Full network shape up front e.g. `[178, 64, 5]`
    pub fn new(network_shape: &[usize]) -> Self {
        assert!(network_shape.len() >= 2, "need at least input and output sizes");
        let last = network_shape.len() - 1;
        let mut nn = Self::new_input(network_shape[0]);
        for (i, &size) in network_shape.iter().enumerate().skip(1) {
            let activation = if i == last {
                Activation::Linear
            } else {
                Activation::Relu
            };
            nn = nn.layer(dense(size).activation(activation));
        }
        nn
    }

    /// Start with the input size, then add each layer with [`Mlp::layer`]
    pub fn new_input(size: usize) -> Self {
        Self {
            input_size: size,
            layers: vec![],
            training: true,
        }
    }

    pub fn layer(mut self, layer: impl Into<DenseBuilder>) -> Self {
        let inputs = self
            .layers
            .last()
            .map(Dense::outputs)
            .unwrap_or(self.input_size);
        self.layers.push(layer.into().build(inputs));
        self
    }

    /// applies to all hidden layers
    pub fn with_activation_hidden(mut self, activation: Activation) -> Self {
        let hidden = self.layers.len().saturating_sub(1);
        for layer in &mut self.layers[..hidden] {
            layer.activation = activation;
        }
        self
    }

    /// applies to output layer only
    pub fn with_activation_output(mut self, activation: Activation) -> Self {
        if let Some(layer) = self.layers.last_mut() {
            layer.activation = activation;
        }
        self
    }

    /// applies to all layers and reinitializes weights
    pub fn with_initialization(mut self, initialization: Initialization) -> Self {
        for layer in &mut self.layers {
            layer.initialization = initialization;
        }
        self.reset_weights();
        self
    }

    /// applies dropout to all hidden layers
    pub fn with_dropout(mut self, rate: f32) -> Self {
        let hidden = self.layers.len().saturating_sub(1);
        for layer in &mut self.layers[..hidden] {
            layer.dropout = Some(Dropout::new(rate, layer.outputs()));
        }
        self
    }

    pub fn reset_weights(&mut self) {
        for layer in &mut self.layers {
            layer.reinitialize();
            layer.zero_grad();
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub(crate) fn update_dropout(&mut self) {
        for layer in &mut self.layers {
            if let Some(d) = &mut layer.dropout {
                d.recalc();
            }
        }
    }

    /// forward returning values for each layer
    pub(crate) fn internal_forward(&self, input: ArrayView2<f32>, training: bool) -> Values {
        assert_eq!(
            input.ncols(),
            self.input_size,
            "input width does not match network"
        );
        let mut values = Values {
            pre: Vec::with_capacity(self.layers.len()),
            activated: Vec::with_capacity(self.layers.len() + 1),
        };
        values.activated.push(input.to_owned());
        for (l, layer) in self.layers.iter().enumerate() {
            let LayerOutput { pre, activated } = layer.forward(&values.activated[l], training);
            values.pre.push(pre);
            values.activated.push(activated);
        }
        values
    }

    ///Returns weights (excluding biases)
    pub fn get_weights(&self) -> Vec<f32> {
        self.layers
            .iter()
            .flat_map(|l| l.weights.iter().copied())
            .collect()
    }

    ///Sets weights (excluding biases)
    pub fn set_weights(&mut self, weights: &[f32]) {
        let mut values = weights.iter();
        for layer in &mut self.layers {
            for (w, v) in layer.weights.iter_mut().zip(&mut values) {
                *w = *v;
            }
        }
    }

    pub fn get_biases(&self) -> Vec<f32> {
        self.layers
            .iter()
            .flat_map(|l| l.bias.iter().copied())
            .collect()
    }

    pub fn set_biases(&mut self, biases: &[f32]) {
        let mut values = biases.iter();
        for layer in &mut self.layers {
            for (b, v) in layer.bias.iter_mut().zip(&mut values) {
                *b = *v;
            }
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        std::iter::once(self.input_size)
            .chain(self.layers.iter().map(Dense::outputs))
            .collect()
    }
}

impl Model for Mlp {
    fn forward(&self, input: ArrayView2<f32>) -> Array2<f32> {
        let mut values = self.internal_forward(input, false);
        values.activated.pop().unwrap_or_default()
    }

    fn backward(
        &mut self,
        input: ArrayView2<f32>,
        targets: &[usize],
        criterion: &dyn Criterion,
    ) -> Result<f32> {
        if input.ncols() != self.input_size {
            return Err(Error::Shape(format!(
                "input has {} features, network expects {}",
                input.ncols(),
                self.input_size
            )));
        }
        check_targets(input.nrows(), self.output_size(), targets)?;

        if self.training {
            self.update_dropout();
        }
        let values = self.internal_forward(input, self.training);
        let outputs = &values.activated[self.layers.len()];
        let loss = criterion.loss(outputs, targets);
        let gradient = criterion.gradient(outputs, targets);

        let training = self.training;
        let mut grad = gradient;
        for (l, layer) in self.layers.iter_mut().enumerate().rev() {
            grad = layer.accumulate(&values.activated[l], &values.pre[l], grad, training);
        }
        Ok(loss)
    }

    fn zero_grad(&mut self) {
        self.layers.iter_mut().for_each(Dense::zero_grad);
    }

    fn parameters(&mut self) -> Vec<(&mut Array2<f32>, &Array2<f32>)> {
        self.layers
            .iter_mut()
            .flat_map(|l| {
                [
                    (&mut l.weights, &l.weight_grad),
                    (&mut l.bias, &l.bias_grad),
                ]
            })
            .collect()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.layers
            .last()
            .map(Dense::outputs)
            .unwrap_or(self.input_size)
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (l, layer) in self.layers.iter().enumerate() {
            state.insert_tensor(format!("weight.{l}"), layer.weights.clone());
            state.insert_tensor(format!("bias.{l}"), layer.bias.clone());
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let stored = state.keys().filter(|k| k.starts_with("weight.")).count();
        if stored != self.layers.len() {
            return Err(Error::Shape(format!(
                "state has {stored} layers, network has {}",
                self.layers.len()
            )));
        }
        //decode everything before touching the network
        let mut loaded = Vec::with_capacity(self.layers.len());
        for (l, layer) in self.layers.iter().enumerate() {
            let weights = state.tensor_like(&format!("weight.{l}"), &layer.weights)?;
            let bias = state.tensor_like(&format!("bias.{l}"), &layer.bias)?;
            loaded.push((weights, bias));
        }
        for (layer, (weights, bias)) in self.layers.iter_mut().zip(loaded) {
            layer.weights = weights;
            layer.bias = bias;
        }
        Ok(())
    }
}

/// Index of the largest value, first one wins on ties
pub fn max_index(values: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

impl Display for Mlp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = self
            .shape()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "shape: [{shape}]")?;
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(f, "layer {i}: {layer}")?;
        }
        Ok(())
    }
}
