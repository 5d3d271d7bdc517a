use std::fmt::Display;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Elementwise nonlinearity of a dense layer, named in lowercase in config files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Linear,
    Tanh,
    #[serde(alias = "silu")]
    Swish,
}

fn sigmoid(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}

impl Activation {
    pub fn apply(self, z: f32) -> f32 {
        match self {
            Activation::Relu => z.max(0.),
            Activation::Sigmoid => sigmoid(z),
            Activation::Linear => z,
            Activation::Tanh => z.tanh(),
            Activation::Swish => z * sigmoid(z),
        }
    }

    /// da/dz at the pre-activation `z`
    pub fn derivative(self, z: f32) -> f32 {
        match self {
            Activation::Relu => f32::from(u8::from(z > 0.)),
            Activation::Sigmoid => {
                let s = sigmoid(z);
                s * (1. - s)
            }
            Activation::Linear => 1.,
            Activation::Tanh => 1. - z.tanh().powi(2),
            Activation::Swish => {
                let s = sigmoid(z);
                s + z * s * (1. - s)
            }
        }
    }

    pub fn apply_all(self, z: &Array2<f32>) -> Array2<f32> {
        z.mapv(|v| self.apply(v))
    }

    pub fn derivative_all(self, z: &Array2<f32>) -> Array2<f32> {
        z.mapv(|v| self.derivative(v))
    }
}

impl Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Activation::Relu => "Relu",
            Activation::Sigmoid => "Sigmoid",
            Activation::Linear => "Linear",
            Activation::Tanh => "Tanh",
            Activation::Swish => "Swish",
        };
        write!(f, "{name}")
    }
}
