//! Epoch loops with periodic evaluation and checkpoint-on-improvement.
//!
//! Every loop resumes from `load_path` when one is given, evaluates on a fixed
//! cadence and only writes a checkpoint when the evaluation loss beats the best so far.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::ArrayView2;

use crate::checkpoint::{load_checkpoint, save_checkpoint};
use crate::dataset::{DataLoader, TensorDataset};
use crate::error::{Error, Result};
use crate::evaluate::{evaluate, evaluate_batch};
use crate::traits::{Criterion, Model, Optimizer, Scheduler};

/// evaluation cadence of [`train`]
pub const EVAL_EVERY: usize = 5;
/// evaluation cadence of the scheduled and batched loops
pub const EVAL_EVERY_BATCHED: usize = 10;
/// best loss before anything has been evaluated
pub const INITIAL_BEST_LOSS: f32 = 1_000_000.0;

/// Where an epoch loop starts and the loss a checkpoint has to beat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainState {
    pub start_epoch: usize,
    pub best_loss: f32,
}

impl Default for TrainState {
    fn default() -> Self {
        Self::fresh()
    }
}

impl TrainState {
    pub fn fresh() -> Self {
        Self {
            start_epoch: 1,
            best_loss: INITIAL_BEST_LOSS,
        }
    }

    /// continue after the checkpointed epoch
    pub fn resume(epoch: usize, eval_loss: f32) -> Self {
        Self {
            start_epoch: epoch + 1,
            best_loss: eval_loss,
        }
    }

    /// Fresh without a path, otherwise restores model and optimizer from the checkpoint
    pub fn from_load_path(
        model: &mut dyn Model,
        optimizer: &mut dyn Optimizer,
        load_path: Option<&Path>,
    ) -> Result<Self> {
        match load_path {
            None => Ok(Self::fresh()),
            Some(path) => {
                let (epoch, eval_loss) = load_checkpoint(model, optimizer, path)?;
                Ok(Self::resume(epoch, eval_loss))
            }
        }
    }

    /// records `eval_loss` if strictly better, returns whether it was
    pub fn improve(&mut self, eval_loss: f32) -> bool {
        if eval_loss < self.best_loss {
            self.best_loss = eval_loss;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrainOptions<'a> {
    /// last epoch to run, inclusive
    pub epochs: usize,
    pub save_path: &'a Path,
    pub load_path: Option<&'a Path>,
}

impl<'a> TrainOptions<'a> {
    pub fn new(epochs: usize, save_path: &'a Path) -> Self {
        Self {
            epochs,
            save_path,
            load_path: None,
        }
    }

    pub fn resume_from(mut self, load_path: &'a Path) -> Self {
        self.load_path = Some(load_path);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub start_epoch: usize,
    pub epochs_run: usize,
    /// loss of the final step of the final epoch
    pub last_loss: Option<f32>,
    pub best_loss: f32,
    /// `(epoch, eval_loss)` for every checkpoint written
    pub checkpoints: Vec<(usize, f32)>,
}

/// One update per item, evaluated every [`EVAL_EVERY`] epochs
pub fn train(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    train_data: &TensorDataset,
    test_data: &TensorDataset,
    options: &TrainOptions,
) -> Result<TrainingSummary> {
    if train_data.is_empty() {
        return Err(Error::EmptyDataset("no training items"));
    }
    run_epochs(
        model,
        optimizer,
        None,
        options,
        EVAL_EVERY,
        |model, optimizer| item_epoch(model, optimizer, criterion, train_data),
        |model| evaluate(model, criterion, test_data),
    )
}

/// [`train`] with a scheduler stepped after each epoch
pub fn train_scheduler(
    model: &mut dyn Model,
    scheduler: &mut dyn Scheduler,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    train_data: &TensorDataset,
    test_data: &TensorDataset,
    options: &TrainOptions,
) -> Result<TrainingSummary> {
    if train_data.is_empty() {
        return Err(Error::EmptyDataset("no training items"));
    }
    run_epochs(
        model,
        optimizer,
        Some(scheduler),
        options,
        EVAL_EVERY_BATCHED,
        |model, optimizer| item_epoch(model, optimizer, criterion, train_data),
        |model| evaluate(model, criterion, test_data),
    )
}

/// One update per batch, evaluated every [`EVAL_EVERY_BATCHED`] epochs
pub fn train_batch(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    train_loader: &DataLoader,
    test_loader: &DataLoader,
    options: &TrainOptions,
) -> Result<TrainingSummary> {
    if train_loader.is_empty() {
        return Err(Error::EmptyDataset("no training batches"));
    }
    run_epochs(
        model,
        optimizer,
        None,
        options,
        EVAL_EVERY_BATCHED,
        |model, optimizer| batch_epoch(model, optimizer, criterion, train_loader),
        |model| evaluate_batch(model, criterion, test_loader),
    )
}

/// [`train_batch`] with a scheduler stepped after each epoch
pub fn train_scheduler_batch(
    model: &mut dyn Model,
    scheduler: &mut dyn Scheduler,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    train_loader: &DataLoader,
    test_loader: &DataLoader,
    options: &TrainOptions,
) -> Result<TrainingSummary> {
    if train_loader.is_empty() {
        return Err(Error::EmptyDataset("no training batches"));
    }
    run_epochs(
        model,
        optimizer,
        Some(scheduler),
        options,
        EVAL_EVERY_BATCHED,
        |model, optimizer| batch_epoch(model, optimizer, criterion, train_loader),
        |model| evaluate_batch(model, criterion, test_loader),
    )
}

fn step(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    x: ArrayView2<f32>,
    y: &[usize],
) -> Result<f32> {
    model.set_training(true);
    optimizer.zero_grad(model);
    let loss = model.backward(x, y, criterion)?;
    optimizer.step(model);
    Ok(loss)
}

fn item_epoch(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    data: &TensorDataset,
) -> Result<f32> {
    let mut loss = 0.;
    for i in 0..data.len() {
        let (x, y) = data.item(i);
        loss = step(model, optimizer, criterion, x, &[y])?;
    }
    Ok(loss)
}

fn batch_epoch(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    loader: &DataLoader,
) -> Result<f32> {
    let mut loss = 0.;
    for (x, y) in loader {
        loss = step(model, optimizer, criterion, x.view(), &y)?;
    }
    Ok(loss)
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} epochs [{elapsed_precise}<{eta_precise}]")
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb
}

fn run_epochs(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    mut scheduler: Option<&mut dyn Scheduler>,
    options: &TrainOptions,
    eval_every: usize,
    mut epoch_pass: impl FnMut(&mut dyn Model, &mut dyn Optimizer) -> Result<f32>,
    mut eval: impl FnMut(&mut dyn Model) -> Result<f32>,
) -> Result<TrainingSummary> {
    let mut state = TrainState::from_load_path(model, optimizer, options.load_path)?;
    let mut summary = TrainingSummary {
        start_epoch: state.start_epoch,
        epochs_run: 0,
        last_loss: None,
        best_loss: state.best_loss,
        checkpoints: vec![],
    };

    let epochs = state.start_epoch..=options.epochs;
    let pb = progress_bar(epochs.clone().count());
    for epoch in epochs {
        let loss = epoch_pass(&mut *model, &mut *optimizer)?;
        summary.epochs_run += 1;
        summary.last_loss = Some(loss);

        match scheduler.as_deref_mut() {
            Some(scheduler) => {
                scheduler.step(loss, &mut *optimizer);
                let lr = optimizer.learning_rate();
                pb.suspend(|| println!("=> Ep: {epoch} loss: {loss} lr: {lr}"));
            }
            None => pb.suspend(|| println!("=> Ep: {epoch} loss: {loss}")),
        }

        if epoch % eval_every == 0 {
            let eval_loss = eval(&mut *model)?;
            pb.suspend(|| println!("eval loss: {eval_loss}"));
            if state.improve(eval_loss) {
                pb.suspend(|| {
                    save_checkpoint(&*model, &*optimizer, epoch, eval_loss, options.save_path)
                })?;
                summary.checkpoints.push((epoch, eval_loss));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    summary.best_loss = state.best_loss;
    Ok(summary)
}
