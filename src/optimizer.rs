use std::fmt::Display;
use std::str::FromStr;

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::state::{StateDict, StateValue};
use crate::traits::{Model, Optimizer};

//used for selection
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptimizerType {
    Sgd,
    Momentum { beta: f32 },
    Adam { beta1: f32, beta2: f32 },
}
impl OptimizerType {
    pub fn momentum() -> Self {
        OptimizerType::Momentum { beta: 0.9 }
    }

    pub fn adam() -> Self {
        OptimizerType::Adam {
            beta1: 0.9,
            beta2: 0.999,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            OptimizerType::Sgd => "sgd",
            OptimizerType::Momentum { .. } => "momentum",
            OptimizerType::Adam { .. } => "adam",
        }
    }
}

impl Display for OptimizerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerType::Sgd => write!(f, "Sgd"),
            OptimizerType::Momentum { beta } => write!(f, "Momentum({})", beta),
            OptimizerType::Adam { beta1, beta2 } => write!(f, "Adam({},{})", beta1, beta2),
        }
    }
}

/// `sgd`, `momentum` or `adam` with default betas
impl FromStr for OptimizerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sgd" | "none" => Ok(OptimizerType::Sgd),
            "momentum" => Ok(OptimizerType::momentum()),
            "adam" => Ok(OptimizerType::adam()),
            other => Err(Error::Config(format!("unknown optimizer {other}"))),
        }
    }
}

/// Gradient descent over every parameter the model exposes.
///
/// Moment buffers are created on the first [`Optimizer::step`], one per parameter,
/// so the same optimizer can be built before it knows the model.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    optimizer_type: OptimizerType,
    learning_rate: f32,
    weight_decay: f32,
    step: usize,
    velocity1: Vec<Array2<f32>>,
    velocity2: Vec<Array2<f32>>,
}

impl GradientDescent {
    pub fn new(optimizer_type: OptimizerType, learning_rate: f32) -> Self {
        Self {
            optimizer_type,
            learning_rate,
            weight_decay: 0.,
            step: 0,
            velocity1: vec![],
            velocity2: vec![],
        }
    }

    /// L2 penalty added to each gradient as `weight_decay * param`
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn optimizer_type(&self) -> OptimizerType {
        self.optimizer_type
    }

    /// number of updates applied so far
    pub fn steps(&self) -> usize {
        self.step
    }

    ///this turns the gradient of parameter `i` into the amount to add to it
    ///e.g. for Sgd, it returns `-learning_rate*gradient`
    fn calc_update(&mut self, i: usize, gradient: Array2<f32>) -> Array2<f32> {
        let learning_rate = self.learning_rate;
        if self.velocity1.len() <= i {
            self.velocity1.push(Array2::zeros(gradient.dim()));
            self.velocity2.push(Array2::zeros(gradient.dim()));
        }
        match self.optimizer_type {
            OptimizerType::Sgd => gradient * -learning_rate,
            OptimizerType::Momentum { beta } => {
                self.velocity1[i] = &self.velocity1[i] * beta + gradient * -learning_rate;
                self.velocity1[i].clone()
            }
            OptimizerType::Adam { beta1, beta2 } => {
                let step = self.step as i32;
                // first and second moment estimates
                self.velocity1[i] = &self.velocity1[i] * beta1 + &gradient * (1.0 - beta1);
                self.velocity2[i] =
                    &self.velocity2[i] * beta2 + gradient.mapv(|x| x.powi(2)) * (1.0 - beta2);

                // bias-corrected
                let m = &self.velocity1[i] / (1.0 - beta1.powi(step));
                let v = &self.velocity2[i] / (1.0 - beta2.powi(step));

                m / (v.mapv(f32::sqrt) + 1e-8) * -learning_rate
            }
        }
    }
}

impl Optimizer for GradientDescent {
    fn step(&mut self, model: &mut dyn Model) {
        self.step += 1;
        let decay = self.weight_decay;
        for (i, (param, grad)) in model.parameters().into_iter().enumerate() {
            let gradient = if decay > 0. {
                grad + &(&*param * decay)
            } else {
                grad.clone()
            };
            let update = self.calc_update(i, gradient);
            *param += &update;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, rate: f32) {
        self.learning_rate = rate;
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("type", StateValue::Text(self.optimizer_type.name().into()));
        state.insert("learning_rate", StateValue::Float(self.learning_rate));
        state.insert("weight_decay", StateValue::Float(self.weight_decay));
        state.insert("step", StateValue::Int(self.step as i64));
        match self.optimizer_type {
            OptimizerType::Sgd => {}
            OptimizerType::Momentum { beta } => state.insert("beta", StateValue::Float(beta)),
            OptimizerType::Adam { beta1, beta2 } => {
                state.insert("beta1", StateValue::Float(beta1));
                state.insert("beta2", StateValue::Float(beta2));
            }
        }
        for (i, (v1, v2)) in self.velocity1.iter().zip(&self.velocity2).enumerate() {
            state.insert_tensor(format!("velocity1.{i}"), v1.clone());
            state.insert_tensor(format!("velocity2.{i}"), v2.clone());
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let name = state.text("type")?;
        if name != self.optimizer_type.name() {
            return Err(Error::Checkpoint(format!(
                "optimizer state is for {name}, not {}",
                self.optimizer_type.name()
            )));
        }
        let optimizer_type = match self.optimizer_type {
            OptimizerType::Sgd => OptimizerType::Sgd,
            OptimizerType::Momentum { .. } => OptimizerType::Momentum {
                beta: state.float("beta")?,
            },
            OptimizerType::Adam { .. } => OptimizerType::Adam {
                beta1: state.float("beta1")?,
                beta2: state.float("beta2")?,
            },
        };
        let learning_rate = state.float("learning_rate")?;
        let weight_decay = state.float("weight_decay")?;
        let step = usize::try_from(state.int("step")?)
            .map_err(|_| Error::Checkpoint("negative optimizer step".into()))?;

        let buffers = state.keys().filter(|k| k.starts_with("velocity1.")).count();
        let mut velocity1 = Vec::with_capacity(buffers);
        let mut velocity2 = Vec::with_capacity(buffers);
        for i in 0..buffers {
            velocity1.push(state.tensor(&format!("velocity1.{i}"))?.clone());
            velocity2.push(state.tensor(&format!("velocity2.{i}"))?.clone());
        }

        self.optimizer_type = optimizer_type;
        self.learning_rate = learning_rate;
        self.weight_decay = weight_decay;
        self.step = step;
        self.velocity1 = velocity1;
        self.velocity2 = velocity2;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn approx_eq(a: &Array2<f32>, b: &Array2<f32>, eps: f32) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < eps)
    }

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = GradientDescent::new(OptimizerType::Sgd, 0.1);
        optimizer.step = 1;

        let weight_grad: Array2<f32> = array![[0.5, -0.5], [1.0, -1.0]];
        let updated = optimizer.calc_update(0, weight_grad);

        let expected: Array2<f32> = array![[0.5 * -0.1, -0.5 * -0.1], [1.0 * -0.1, -1.0 * -0.1]];
        assert!(approx_eq(&updated, &expected, 1e-6));
    }

    #[test]
    fn test_momentum_optimizer() {
        let beta = 0.9;
        let mut optimizer = GradientDescent::new(OptimizerType::Momentum { beta }, 0.1);
        let weight_grad: Array2<f32> = array![[0.5, -0.5], [1.0, -1.0]];

        // First update: velocity should be just -learning_rate * gradient
        optimizer.step = 1;
        let updated = optimizer.calc_update(0, weight_grad.clone());
        let expected: Array2<f32> = array![[0.5 * -0.1, -0.5 * -0.1], [1.0 * -0.1, -1.0 * -0.1]];
        assert!(approx_eq(&updated, &expected, 1e-6));

        // Second update: velocity should accumulate
        optimizer.step = 2;
        let updated2 = optimizer.calc_update(0, weight_grad);
        let expected2 = &expected * beta + &expected;
        assert!(approx_eq(&updated2, &expected2, 1e-6));
    }

    #[test]
    fn test_adam_optimizer() {
        let mut optimizer = GradientDescent::new(OptimizerType::adam(), 0.1);
        optimizer.step = 1;

        // with bias-correction the first step is ~= -learning_rate * sign(gradient)
        let weight_grad: Array2<f32> = array![[0.5, -0.5], [1.0, -1.0]];
        let updated = optimizer.calc_update(0, weight_grad);

        let expected: Array2<f32> = array![[-0.1, 0.1], [-0.1, 0.1]];
        assert!(approx_eq(&updated, &expected, 1e-6));
    }

    #[test]
    fn parse_names() {
        assert_eq!("sgd".parse::<OptimizerType>().unwrap(), OptimizerType::Sgd);
        assert_eq!("Adam".parse::<OptimizerType>().unwrap(), OptimizerType::adam());
        assert!("rmsprop".parse::<OptimizerType>().is_err());
    }

    #[test]
    fn state_round_trip() {
        let mut a = GradientDescent::new(OptimizerType::adam(), 0.01).with_weight_decay(0.001);
        a.step = 1;
        a.calc_update(0, array![[1f32, 2.]]);
        a.calc_update(1, array![[3f32]]);

        let mut b = GradientDescent::new(OptimizerType::adam(), 0.5);
        b.load_state_dict(&a.state_dict()).unwrap();
        assert_eq!(b.learning_rate(), 0.01);
        assert_eq!(b.steps(), 1);
        assert_eq!(b.velocity1, a.velocity1);
        assert_eq!(b.velocity2, a.velocity2);
        assert_eq!(b.weight_decay, 0.001);
    }

    #[test]
    fn state_for_other_type_is_rejected() {
        let a = GradientDescent::new(OptimizerType::momentum(), 0.01);
        let mut b = GradientDescent::new(OptimizerType::adam(), 0.5);
        assert!(matches!(
            b.load_state_dict(&a.state_dict()),
            Err(Error::Checkpoint(_))
        ));
        assert_eq!(b.learning_rate(), 0.5);
    }
}
