//! Run configuration loaded from a TOML file.
//!
//! Every table and key is optional, missing ones take the defaults below.
//!
//! ```toml
//! [data]
//! train_csv = "data/train.csv"
//! test_csv = "data/test.csv"
//! scale = true
//! reduce_components = 64
//!
//! [model]
//! hidden_layers = [128, 64]
//! activation = "relu"
//! dropout = 0.2
//!
//! [training]
//! epochs = 100
//! batch_size = 32
//! optimizer = "adam"
//! save_path = "checkpoints/best.ckpt"
//!
//! [training.scheduler]
//! factor = 0.5
//! patience = 5
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::activation::Activation;
use crate::dataset::{LabelMode, LoaderParams, CLASSES};
use crate::error::{Error, Result};
use crate::initialization::Initialization;
use crate::learning::{LearningRate, PlateauConfig};
use crate::layer::dense;
use crate::nn::Mlp;
use crate::optimizer::{GradientDescent, OptimizerType};

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub train_csv: PathBuf,
    pub test_csv: PathBuf,
    /// binary labels against this class when set
    pub binary_base: Option<usize>,
    /// whitened PCA to this many features when set
    pub reduce_components: Option<usize>,
    pub scale: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_csv: "data/train.csv".into(),
            test_csv: "data/test.csv".into(),
            binary_base: None,
            reduce_components: None,
            scale: true,
        }
    }
}

impl DataConfig {
    pub fn label_mode(&self) -> LabelMode {
        match self.binary_base {
            Some(base) => LabelMode::Binary { base },
            None => LabelMode::MultiClass,
        }
    }

    /// number of model outputs
    pub fn classes(&self) -> usize {
        self.label_mode().classes(CLASSES)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub dropout: Option<f32>,
    pub initialization: Initialization,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64],
            activation: Activation::Relu,
            dropout: None,
            initialization: Initialization::Xavier,
        }
    }
}

impl ModelConfig {
    /// Hidden layers as configured, linear output of `outputs`
    pub fn build(&self, inputs: usize, outputs: usize) -> Result<Mlp> {
        if let Some(rate) = self.dropout {
            if !(rate > 0. && rate < 1.) {
                return Err(Error::Config(format!(
                    "dropout must be in range (0,1), got {rate}"
                )));
            }
        }
        let mut nn = Mlp::new_input(inputs);
        for &size in &self.hidden_layers {
            let mut layer = dense(size)
                .activation(self.activation)
                .initializer(self.initialization);
            if let Some(rate) = self.dropout {
                layer = layer.dropout(rate);
            }
            nn = nn.layer(layer);
        }
        Ok(nn.layer(
            dense(outputs)
                .activation(Activation::Linear)
                .initializer(self.initialization),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    pub learning_rate: f32,
    /// `sgd`, `momentum` or `adam`
    pub optimizer: String,
    pub weight_decay: f32,
    pub save_path: PathBuf,
    pub load_path: Option<PathBuf>,
    /// reduce on plateau when set
    pub scheduler: Option<PlateauConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            shuffle: true,
            learning_rate: 0.001,
            optimizer: "adam".into(),
            weight_decay: 0.,
            save_path: "checkpoints/best.ckpt".into(),
            load_path: None,
            scheduler: None,
        }
    }
}

impl TrainingConfig {
    pub fn optimizer(&self) -> Result<GradientDescent> {
        let typ: OptimizerType = self.optimizer.parse()?;
        Ok(GradientDescent::new(typ, self.learning_rate).with_weight_decay(self.weight_decay))
    }

    pub fn loader_params(&self) -> LoaderParams {
        LoaderParams {
            batch_size: self.batch_size,
            shuffle: self.shuffle,
        }
    }

    pub fn scheduler(&self) -> Option<LearningRate> {
        self.scheduler.map(|s| s.build(self.learning_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{Model, Optimizer};

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.data.classes(), 5);
    }

    #[test]
    fn full_file() {
        let cfg = Config::parse(
            r#"
            [data]
            train_csv = "a.csv"
            test_csv = "b.csv"
            binary_base = 0
            reduce_components = 16
            scale = false

            [model]
            hidden_layers = [32, 16]
            activation = "tanh"
            dropout = 0.1
            initialization = "he"

            [training]
            epochs = 7
            batch_size = 4
            shuffle = false
            learning_rate = 0.01
            optimizer = "momentum"
            save_path = "out/best.ckpt"
            load_path = "out/old.ckpt"

            [training.scheduler]
            patience = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data.label_mode(), LabelMode::Binary { base: 0 });
        assert_eq!(cfg.data.classes(), 2);
        assert_eq!(cfg.data.reduce_components, Some(16));
        assert_eq!(cfg.model.activation, Activation::Tanh);
        assert_eq!(cfg.training.load_path, Some(PathBuf::from("out/old.ckpt")));

        let opt = cfg.training.optimizer().unwrap();
        assert_eq!(opt.optimizer_type(), OptimizerType::momentum());
        assert_eq!(opt.learning_rate(), 0.01);
        assert_eq!(cfg.training.scheduler().unwrap().get(), 0.01);

        let nn = cfg.model.build(16, cfg.data.classes()).unwrap();
        assert_eq!(nn.shape(), vec![16, 32, 16, 2]);
        assert_eq!(nn.output_size(), 2);
    }

    #[test]
    fn example_file_loads() {
        let cfg = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.toml")).unwrap();
        assert_eq!(cfg.model.hidden_layers, vec![128, 64]);
        assert_eq!(cfg.model.dropout, Some(0.2));
        assert_eq!(cfg.training.loader_params().batch_size, 32);
        assert_eq!(cfg.training.scheduler.unwrap().patience, 5);
        assert!(cfg.training.load_path.is_none());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(
            Config::parse("[model]\nactivation = \"softplus\""),
            Err(Error::Config(_))
        ));
        for rate in ["1.5", "0.0"] {
            let cfg = Config::parse(&format!("[model]\ndropout = {rate}")).unwrap();
            assert!(matches!(cfg.model.build(4, 2), Err(Error::Config(_))));
        }
        let cfg = Config::parse("[training]\noptimizer = \"rmsprop\"").unwrap();
        assert!(matches!(cfg.training.optimizer(), Err(Error::Config(_))));
        assert!(matches!(
            Config::load("no/such/config.toml"),
            Err(Error::Config(_))
        ));
    }
}
