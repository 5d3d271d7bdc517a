use std::collections::BTreeSet;
use std::fmt::Display;

use ndarray::{Array2, ArrayView2};

use crate::dataset::{DataLoader, TensorDataset};
use crate::error::{Error, Result};
use crate::loss::check_targets;
use crate::nn::max_index;
use crate::traits::{Criterion, Model};

/// Mean loss over every item, one forward pass each, no updates
pub fn evaluate(
    model: &mut dyn Model,
    criterion: &dyn Criterion,
    dataset: &TensorDataset,
) -> Result<f32> {
    if dataset.is_empty() {
        return Err(Error::EmptyDataset("nothing to evaluate"));
    }
    model.set_training(false);
    let mut total = 0.;
    for i in 0..dataset.len() {
        let (x, y) = dataset.item(i);
        total += batch_loss(model, criterion, x, &[y])?;
    }
    Ok(total / dataset.len() as f32)
}

/// Mean of the per batch losses
pub fn evaluate_batch(
    model: &mut dyn Model,
    criterion: &dyn Criterion,
    loader: &DataLoader,
) -> Result<f32> {
    if loader.is_empty() {
        return Err(Error::EmptyDataset("nothing to evaluate"));
    }
    model.set_training(false);
    let mut losses = vec![];
    for (x, y) in loader {
        losses.push(batch_loss(model, criterion, x.view(), &y)?);
    }
    Ok(losses.iter().sum::<f32>() / losses.len() as f32)
}

fn check_width(model: &dyn Model, x: ArrayView2<f32>) -> Result<()> {
    if x.ncols() != model.input_size() {
        return Err(Error::Shape(format!(
            "input has {} features, model expects {}",
            x.ncols(),
            model.input_size()
        )));
    }
    Ok(())
}

fn batch_loss(
    model: &dyn Model,
    criterion: &dyn Criterion,
    x: ArrayView2<f32>,
    y: &[usize],
) -> Result<f32> {
    check_width(model, x)?;
    let output = model.forward(x);
    check_targets(output.nrows(), output.ncols(), y)?;
    Ok(criterion.loss(&output, y))
}

/// Arg-max class for each row of `features`
pub fn predict(model: &dyn Model, features: &Array2<f32>) -> Result<Vec<usize>> {
    check_width(model, features.view())?;
    Ok(argmax(&model.forward(features.view())))
}

/// Sums the scores of every model, then takes the arg-max
pub fn ensemble_predict(
    models: &[&dyn Model],
    features: &Array2<f32>,
    n_classes: usize,
) -> Result<Vec<usize>> {
    if models.is_empty() {
        return Err(Error::EmptyDataset("ensemble has no models"));
    }
    let mut scores = Array2::zeros((features.nrows(), n_classes));
    for model in models {
        check_width(*model, features.view())?;
        let output = model.forward(features.view());
        if output.dim() != scores.dim() {
            return Err(Error::Shape(format!(
                "model output {:?}, ensemble expects {:?}",
                output.dim(),
                scores.dim()
            )));
        }
        scores += &output;
    }
    Ok(argmax(&scores))
}

pub fn argmax(scores: &Array2<f32>) -> Vec<usize> {
    scores.rows().into_iter().map(max_index).collect()
}

fn check_pairs(y_true: &[usize], y_pred: &[usize]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(Error::Shape(format!(
            "{} true labels, {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(Error::EmptyDataset("no predictions to score"));
    }
    Ok(())
}

pub fn accuracy_score(y_true: &[usize], y_pred: &[usize]) -> Result<f32> {
    check_pairs(y_true, y_pred)?;
    let correct = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    Ok(correct as f32 / y_true.len() as f32)
}

/// Rows are true labels, columns predictions, both over the sorted labels seen in either
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize]) -> Result<Array2<usize>> {
    check_pairs(y_true, y_pred)?;
    Ok(confusion(&labels_of(y_true, y_pred), y_true, y_pred))
}

fn labels_of(y_true: &[usize], y_pred: &[usize]) -> Vec<usize> {
    y_true
        .iter()
        .chain(y_pred)
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn confusion(labels: &[usize], y_true: &[usize], y_pred: &[usize]) -> Array2<usize> {
    let mut m = Array2::zeros((labels.len(), labels.len()));
    let pos = |l: &usize| labels.binary_search(l).unwrap_or_default();
    for (t, p) in y_true.iter().zip(y_pred) {
        m[[pos(t), pos(p)]] += 1;
    }
    m
}

/// Per class precision, recall and f1 with their averages
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub labels: Vec<usize>,
    pub confusion: Array2<usize>,
    pub precision: Vec<f32>,
    pub recall: Vec<f32>,
    pub f1: Vec<f32>,
    pub support: Vec<usize>,
    pub accuracy: f32,
}

impl ClassificationReport {
    pub fn new(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        check_pairs(y_true, y_pred)?;
        let labels = labels_of(y_true, y_pred);
        let confusion = confusion(&labels, y_true, y_pred);

        let ratio = |num: usize, den: usize| if den == 0 { 0. } else { num as f32 / den as f32 };
        let mut precision = vec![];
        let mut recall = vec![];
        let mut f1 = vec![];
        let mut support = vec![];
        for k in 0..labels.len() {
            let tp = confusion[[k, k]];
            let predicted = confusion.column(k).sum();
            let actual = confusion.row(k).sum();
            let p = ratio(tp, predicted);
            let r = ratio(tp, actual);
            precision.push(p);
            recall.push(r);
            f1.push(if p + r > 0. { 2. * p * r / (p + r) } else { 0. });
            support.push(actual);
        }

        Ok(Self {
            accuracy: accuracy_score(y_true, y_pred)?,
            labels,
            confusion,
            precision,
            recall,
            f1,
            support,
        })
    }

    /// unweighted mean over classes `(precision, recall, f1)`
    pub fn macro_avg(&self) -> (f32, f32, f32) {
        let n = self.labels.len().max(1) as f32;
        let mean = |v: &[f32]| v.iter().sum::<f32>() / n;
        (mean(&self.precision), mean(&self.recall), mean(&self.f1))
    }

    /// mean over classes weighted by support
    pub fn weighted_avg(&self) -> (f32, f32, f32) {
        let total = self.total_support().max(1) as f32;
        let weighted = |v: &[f32]| {
            v.iter()
                .zip(&self.support)
                .map(|(x, &s)| x * s as f32)
                .sum::<f32>()
                / total
        };
        (
            weighted(&self.precision),
            weighted(&self.recall),
            weighted(&self.f1),
        )
    }

    pub fn total_support(&self) -> usize {
        self.support.iter().sum()
    }
}

impl Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.confusion)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (k, label) in self.labels.iter().enumerate() {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, self.precision[k], self.recall[k], self.f1[k], self.support[k]
            )?;
        }
        writeln!(f)?;
        let total = self.total_support();
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, total
        )?;
        let (p, r, f1) = self.macro_avg();
        writeln!(
            f,
            "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "macro avg", p, r, f1, total
        )?;
        let (p, r, f1) = self.weighted_avg();
        write!(
            f,
            "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "weighted avg", p, r, f1, total
        )
    }
}

/// Prints the confusion matrix and per class scores, returns accuracy
pub fn report(y_true: &[usize], y_pred: &[usize]) -> Result<f32> {
    let report = ClassificationReport::new(y_true, y_pred)?;
    println!("{report}");
    println!("accuracy: {}", report.accuracy);
    Ok(report.accuracy)
}
