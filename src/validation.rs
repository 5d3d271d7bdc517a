use crate::error::{Error, Result};

/// Deals rows at random into `n_folds` folds of `len / n_folds` rows each.
/// Leftover rows are not used.
pub fn cross_validation_split<T: Clone>(dataset: &[T], n_folds: usize) -> Result<Vec<Vec<T>>> {
    if n_folds == 0 || n_folds > dataset.len() {
        return Err(Error::Folds {
            n_folds,
            len: dataset.len(),
        });
    }
    let fold_size = dataset.len() / n_folds;
    let mut remaining = dataset.to_vec();
    let mut folds = Vec::with_capacity(n_folds);
    for _ in 0..n_folds {
        let mut fold = Vec::with_capacity(fold_size);
        while fold.len() < fold_size {
            let index = fastrand::usize(..remaining.len());
            fold.push(remaining.swap_remove(index));
        }
        folds.push(fold);
    }
    Ok(folds)
}

/// Scores `algorithm` once per fold, holding that fold out.
///
/// Rows end with their label. `algorithm(train, test)` gets the other folds as
/// `train` and the held out rows without their label as `test`, and returns one
/// prediction per test row. Extra arguments go in the closure.
///
///```rust
///   use seizure_nn::validation::evaluate_algorithm;
///   let rows: Vec<Vec<i32>> = (0..20).map(|i| vec![i, i % 2]).collect();
///   let parity = |_: &[Vec<i32>], test: &[Vec<i32>]| test.iter().map(|r| r[0] % 2).collect::<Vec<_>>();
///   let scores = evaluate_algorithm(&rows, parity, 4).unwrap();
///   assert_eq!(scores, vec![1.0; 4]);
///```
pub fn evaluate_algorithm<T, F>(dataset: &[Vec<T>], mut algorithm: F, n_folds: usize) -> Result<Vec<f64>>
where
    T: Clone + PartialEq,
    F: FnMut(&[Vec<T>], &[Vec<T>]) -> Vec<T>,
{
    let folds = cross_validation_split(dataset, n_folds)?;
    let mut scores = Vec::with_capacity(folds.len());
    for (k, fold) in folds.iter().enumerate() {
        let train_set: Vec<Vec<T>> = folds
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != k)
            .flat_map(|(_, f)| f.iter().cloned())
            .collect();

        let mut test_set = Vec::with_capacity(fold.len());
        let mut actual = Vec::with_capacity(fold.len());
        for row in fold {
            let Some((label, features)) = row.split_last() else {
                return Err(Error::Shape("cross validation row has no label".into()));
            };
            test_set.push(features.to_vec());
            actual.push(label.clone());
        }

        let predicted = algorithm(&train_set, &test_set);
        if predicted.len() != actual.len() {
            return Err(Error::Shape(format!(
                "{} predictions for {} held out rows",
                predicted.len(),
                actual.len()
            )));
        }
        scores.push(accuracy_metric(&actual, &predicted));
    }
    Ok(scores)
}

/// Fraction of positions where both agree
pub fn accuracy_metric<T: PartialEq>(actual: &[T], predicted: &[T]) -> f64 {
    let correct = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    correct as f64 / actual.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn folds_are_disjoint_and_complete() {
        fastrand::seed(11);
        let data: Vec<usize> = (0..100).collect();
        let folds = cross_validation_split(&data, 5).unwrap();
        assert_eq!(folds.len(), 5);
        assert!(folds.iter().all(|f| f.len() == 20));
        let all: HashSet<usize> = folds.iter().flatten().copied().collect();
        assert_eq!(all.len(), 100);
    }

    #[test]
    fn remainder_is_dropped() {
        let data: Vec<usize> = (0..11).collect();
        let folds = cross_validation_split(&data, 3).unwrap();
        assert_eq!(folds.iter().map(Vec::len).sum::<usize>(), 9);
    }

    #[test]
    fn bad_fold_counts() {
        let data = [1, 2, 3];
        assert!(matches!(
            cross_validation_split(&data, 0),
            Err(Error::Folds { n_folds: 0, len: 3 })
        ));
        assert!(cross_validation_split(&data, 4).is_err());
    }

    #[test]
    fn algorithm_never_sees_held_out_labels() {
        fastrand::seed(3);
        let rows: Vec<Vec<i64>> = (0..30).map(|i| vec![i, i * 10, i % 3]).collect();
        let scores = evaluate_algorithm(
            &rows,
            |train, test| {
                assert_eq!(train.len(), 20);
                assert!(train.iter().all(|r| r.len() == 3));
                assert!(test.iter().all(|r| r.len() == 2));
                // always guess class 0
                vec![0; test.len()]
            },
            3,
        )
        .unwrap();
        assert_eq!(scores.len(), 3);
        let mean = scores.iter().sum::<f64>() / 3.;
        assert!((mean - 1. / 3.).abs() < 1e-9);
    }

    #[test]
    fn wrong_prediction_count() {
        let rows: Vec<Vec<i64>> = (0..4).map(|i| vec![i, 0]).collect();
        let res = evaluate_algorithm(&rows, |_, _| vec![], 2);
        assert!(matches!(res, Err(Error::Shape(_))));
    }

    #[test]
    fn accuracy_is_a_fraction() {
        assert_eq!(accuracy_metric(&[1, 2, 3, 4], &[1, 2, 0, 0]), 0.5);
    }
}
