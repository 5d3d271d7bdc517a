use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single entry of a [`StateDict`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Tensor(Array2<f32>),
    Float(f32),
    Int(i64),
    Text(String),
}

/// Named snapshot of model parameters or optimizer state.
///
/// Keys are ordered so serialized output is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDict(BTreeMap<String, StateValue>);

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: StateValue) {
        self.0.insert(key.into(), value);
    }

    pub fn insert_tensor(&mut self, key: impl Into<String>, tensor: Array2<f32>) {
        self.insert(key, StateValue::Tensor(tensor));
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tensor(&self, key: &str) -> Result<&Array2<f32>> {
        match self.get(key) {
            Some(StateValue::Tensor(t)) => Ok(t),
            Some(other) => Err(Error::Checkpoint(format!(
                "{key} should be a tensor, found {other:?}"
            ))),
            None => Err(Error::MissingState(key.to_string())),
        }
    }

    pub fn float(&self, key: &str) -> Result<f32> {
        match self.get(key) {
            Some(StateValue::Float(v)) => Ok(*v),
            Some(other) => Err(Error::Checkpoint(format!(
                "{key} should be a float, found {other:?}"
            ))),
            None => Err(Error::MissingState(key.to_string())),
        }
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        match self.get(key) {
            Some(StateValue::Int(v)) => Ok(*v),
            Some(other) => Err(Error::Checkpoint(format!(
                "{key} should be an integer, found {other:?}"
            ))),
            None => Err(Error::MissingState(key.to_string())),
        }
    }

    pub fn text(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(StateValue::Text(v)) => Ok(v),
            Some(other) => Err(Error::Checkpoint(format!(
                "{key} should be text, found {other:?}"
            ))),
            None => Err(Error::MissingState(key.to_string())),
        }
    }

    /// Tensor stored under `key`, checked against the shape it will replace
    pub fn tensor_like(&self, key: &str, like: &Array2<f32>) -> Result<Array2<f32>> {
        let t = self.tensor(key)?;
        if t.dim() != like.dim() {
            return Err(Error::Shape(format!(
                "{key}: expected {:?}, found {:?}",
                like.dim(),
                t.dim()
            )));
        }
        Ok(t.clone())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn typed_getters() {
        let mut state = StateDict::new();
        state.insert_tensor("w", arr2(&[[1., 2.]]));
        state.insert("lr", StateValue::Float(0.1));
        state.insert("step", StateValue::Int(3));
        state.insert("kind", StateValue::Text("adam".into()));

        assert_eq!(state.tensor("w").unwrap(), &arr2(&[[1f32, 2.]]));
        assert_eq!(state.float("lr").unwrap(), 0.1);
        assert_eq!(state.int("step").unwrap(), 3);
        assert_eq!(state.text("kind").unwrap(), "adam");
        assert!(matches!(state.float("w"), Err(Error::Checkpoint(_))));
        assert!(matches!(state.int("nope"), Err(Error::MissingState(_))));
    }

    #[test]
    fn tensor_like_checks_shape() {
        let mut state = StateDict::new();
        state.insert_tensor("w", arr2(&[[1., 2.]]));
        let ok = state.tensor_like("w", &Array2::zeros((1, 2)));
        assert!(ok.is_ok());
        let bad = state.tensor_like("w", &Array2::zeros((2, 1)));
        assert!(matches!(bad, Err(Error::Shape(_))));
    }

    #[test]
    fn keys_are_sorted() {
        let mut state = StateDict::new();
        state.insert("b", StateValue::Int(1));
        state.insert("a", StateValue::Int(2));
        assert_eq!(state.keys().collect::<Vec<_>>(), ["a", "b"]);
    }
}
