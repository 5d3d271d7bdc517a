//! Training, evaluation and cross-validation utilities for classifiers on
//! seizure recordings: rows of 178 integer features and a 5-way label.
//!
//!```rust,no_run
//!   use seizure_nn::prelude::*;
//!   use std::path::Path;
//!
//!   let train_set = load_dataset("data/train.csv").unwrap();
//!   let test_set = load_dataset("data/test.csv").unwrap();
//!
//!   let mut net = Mlp::new(&[FEATURES, 64, CLASSES]);
//!   let mut opt = GradientDescent::new(OptimizerType::adam(), 0.001);
//!   let options = TrainOptions::new(20, Path::new("checkpoints/best.ckpt"));
//!   let summary = train(
//!       &mut net,
//!       &mut opt,
//!       &Loss::SoftmaxAndCrossEntropy,
//!       &train_set,
//!       &test_set,
//!       &options,
//!   )
//!   .unwrap();
//!   println!("best eval loss {}", summary.best_loss);
//!```

pub mod activation;
pub mod checkpoint;
pub mod config;
pub mod dataset;
mod dropout;
pub mod error;
pub mod evaluate;
pub mod initialization;
pub mod layer;
pub mod learning;
pub mod loss;
pub mod nn;
pub mod optimizer;
pub mod state;
pub mod train;
pub mod traits;
pub mod transform;
pub mod validation;

pub mod prelude {
    pub use crate::activation::Activation;
    pub use crate::checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
    pub use crate::config::Config;
    pub use crate::dataset::{
        load_dataset, load_dataset_batch, load_dataset_binary, read_csv, DataLoader, Dataset,
        LabelMode, LoaderParams, TensorDataset, CLASSES, FEATURES,
    };
    pub use crate::error::{Error, Result};
    pub use crate::evaluate::{
        ensemble_predict, evaluate, evaluate_batch, predict, report, ClassificationReport,
    };
    pub use crate::initialization::Initialization;
    pub use crate::layer::dense;
    pub use crate::learning::{LearningRate, Rate};
    pub use crate::loss::Loss;
    pub use crate::nn::Mlp;
    pub use crate::optimizer::{GradientDescent, OptimizerType};
    pub use crate::state::{StateDict, StateValue};
    pub use crate::train::{
        train, train_batch, train_scheduler, train_scheduler_batch, TrainOptions, TrainState,
        TrainingSummary,
    };
    pub use crate::traits::{Criterion, Model, Optimizer, Scheduler};
    pub use crate::transform::{feature_reduction, feature_scaler, Pca, StandardScaler};
    pub use crate::validation::{accuracy_metric, cross_validation_split, evaluate_algorithm};
}
