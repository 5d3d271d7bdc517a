//! Contracts between the training loop and the things it drives.
//!
//! The orchestration in [`crate::train`], [`crate::evaluate`] and
//! [`crate::checkpoint`] only talks to these traits. [`crate::nn::Mlp`],
//! [`crate::optimizer::GradientDescent`], [`crate::loss::Loss`] and
//! [`crate::learning::LearningRate`] are the implementations bundled with the crate.

use ndarray::{Array2, ArrayView2};

use crate::error::Result;
use crate::state::StateDict;

/// A trainable classifier producing one row of class scores per input row.
pub trait Model {
    /// Inference pass. Never applies training-only behaviour such as dropout.
    /// `input` must be [`Model::input_size`] wide.
    fn forward(&self, input: ArrayView2<f32>) -> Array2<f32>;

    /// Forward pass, loss and backpropagation for one batch.
    /// Gradients are added to the stored gradients, so call [`Model::zero_grad`] between steps.
    /// Returns the batch loss.
    fn backward(
        &mut self,
        input: ArrayView2<f32>,
        targets: &[usize],
        criterion: &dyn Criterion,
    ) -> Result<f32>;

    fn zero_grad(&mut self);

    /// Every parameter paired with its current gradient, in a stable order
    fn parameters(&mut self) -> Vec<(&mut Array2<f32>, &Array2<f32>)>;

    /// Switches between training and inference behaviour
    fn set_training(&mut self, training: bool);

    /// Number of features per input row
    fn input_size(&self) -> usize;

    /// Width of each output row
    fn output_size(&self) -> usize;

    fn state_dict(&self) -> StateDict;

    /// Replaces all parameters. Nothing is modified if any entry is missing or mis-shaped.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()>;
}

/// Updates model parameters from their gradients.
pub trait Optimizer {
    fn zero_grad(&mut self, model: &mut dyn Model) {
        model.zero_grad();
    }

    fn step(&mut self, model: &mut dyn Model);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, rate: f32);

    fn state_dict(&self) -> StateDict;

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()>;
}

/// Scores model output against class-index targets.
///
/// Callers guarantee `targets.len() == output.nrows()` and every target is a valid column.
pub trait Criterion {
    /// Mean loss over the rows of `output`
    fn loss(&self, output: &Array2<f32>, targets: &[usize]) -> f32;

    /// Gradient of [`Criterion::loss`] with respect to `output`
    fn gradient(&self, output: &Array2<f32>, targets: &[usize]) -> Array2<f32>;
}

/// Adjusts the optimizer's learning rate once per epoch.
pub trait Scheduler {
    /// `metric` is the last training loss of the epoch
    fn step(&mut self, metric: f32, optimizer: &mut dyn Optimizer);
}
