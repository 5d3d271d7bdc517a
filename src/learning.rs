use std::fmt::Display;

use serde::Deserialize;

use crate::traits::{Optimizer, Scheduler};

#[derive(Debug, Clone)]
pub struct LearningRate {
    pub rate: Rate,
    pub step: usize,
    current: f32,
    best: f32,
    bad_epochs: usize,
}
impl From<f32> for LearningRate {
    fn from(rate: f32) -> Self {
        Self::new(Rate::Constant(rate))
    }
}

impl LearningRate {
    pub fn new(rate: Rate) -> Self {
        let current = match rate {
            Rate::Constant(lr) => lr,
            Rate::Cosine { start_rate, .. } => start_rate,
            Rate::Plateau { start_rate, .. } => start_rate,
        };
        Self {
            rate,
            step: 0,
            current,
            best: f32::INFINITY,
            bad_epochs: 0,
        }
    }

    /// Reduce on plateau with the usual defaults, factor 0.1 and patience 10
    pub fn plateau(start_rate: f32) -> Self {
        Self::new(Rate::Plateau {
            start_rate,
            factor: 0.1,
            patience: 10,
            threshold: 1e-4,
            min_rate: 0.,
        })
    }

    pub fn get(&self) -> f32 {
        match self.rate {
            Rate::Constant(lr) => lr,
            Rate::Cosine {
                start_rate,
                warmup_target_rate,
                warmup_steps,
                total_steps,
                min_rate,
            } => {
                let peak = if warmup_target_rate > 0. {
                    warmup_target_rate
                } else {
                    start_rate
                };
                if self.step < warmup_steps {
                    let t = self.step as f32 / warmup_steps as f32;
                    start_rate + (peak - start_rate) * t
                } else if self.step >= total_steps {
                    min_rate
                } else {
                    let t = (self.step - warmup_steps) as f32 / (total_steps - warmup_steps) as f32;
                    min_rate + (peak - min_rate) * 0.5 * (1. + (std::f32::consts::PI * t).cos())
                }
            }
            Rate::Plateau { .. } => self.current,
        }
    }

    /// Advances one epoch, `metric` only matters for [`Rate::Plateau`].
    /// Returns true when a plateau reduced the rate
    pub fn advance(&mut self, metric: f32) -> bool {
        self.step += 1;
        if let Rate::Plateau {
            factor,
            patience,
            threshold,
            min_rate,
            ..
        } = self.rate
        {
            //relative improvement, a NaN metric never counts
            if metric < self.best * (1. - threshold) {
                self.best = metric;
                self.bad_epochs = 0;
            } else {
                self.bad_epochs += 1;
            }
            if self.bad_epochs > patience {
                self.current = (self.current * factor).max(min_rate);
                self.bad_epochs = 0;
                return true;
            }
        }
        false
    }
}

impl Scheduler for LearningRate {
    /// Plateau scales whatever rate the optimizer holds, e.g. one restored
    /// from a checkpoint, and only writes when it reduces it
    fn step(&mut self, metric: f32, optimizer: &mut dyn Optimizer) {
        if let Rate::Plateau { .. } = self.rate {
            self.current = optimizer.learning_rate();
            if self.advance(metric) {
                optimizer.set_learning_rate(self.current);
            }
        } else {
            self.advance(metric);
            optimizer.set_learning_rate(self.get());
        }
    }
}

impl Display for LearningRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.rate {
            Rate::Constant(_) => "Constant",
            Rate::Cosine { .. } => "Cosine",
            Rate::Plateau { .. } => "Plateau",
        };
        write!(f, "{name} {}", self.get())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rate {
    Constant(f32),
    Cosine {
        start_rate: f32,
        warmup_target_rate: f32,
        warmup_steps: usize,
        ///this is the total number of steps (1 step is an epoch)
        total_steps: usize,
        min_rate: f32,
    },
    /// Multiplies the rate by `factor` once the metric has not improved
    /// by more than `threshold` (relative) for more than `patience` epochs
    Plateau {
        start_rate: f32,
        factor: f32,
        patience: usize,
        threshold: f32,
        min_rate: f32,
    },
}

/// `[training.scheduler]` table of a run config
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlateauConfig {
    pub factor: f32,
    pub patience: usize,
    pub threshold: f32,
    pub min_rate: f32,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor: 0.1,
            patience: 10,
            threshold: 1e-4,
            min_rate: 0.,
        }
    }
}

impl PlateauConfig {
    pub fn build(&self, start_rate: f32) -> LearningRate {
        LearningRate::new(Rate::Plateau {
            start_rate,
            factor: self.factor,
            patience: self.patience,
            threshold: self.threshold,
            min_rate: self.min_rate,
        })
    }
}
