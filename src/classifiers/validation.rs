// src/classifiers/validation.rs
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{LinkerError, LinkerResult};

/// Splits row indices into `k` test folds that preserve the class ratio.
/// Each class is shuffled with `seed` and dealt round-robin over the folds.
pub fn stratified_k_fold(labels: &[bool], k: usize, seed: u64) -> LinkerResult<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(LinkerError::InvalidParameter {
            parameter: "folds".to_string(),
            reason: format!("need at least 2 folds, got {}", k),
        });
    }
    let mut positives: Vec<usize> = (0..labels.len()).filter(|&i| labels[i]).collect();
    let mut negatives: Vec<usize> = (0..labels.len()).filter(|&i| !labels[i]).collect();
    let smallest = positives.len().min(negatives.len());
    if smallest < k {
        return Err(LinkerError::training(format!(
            "{} folds need at least {} samples of each class, the smallest class has {}",
            k, k, smallest
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    positives.shuffle(&mut rng);
    negatives.shuffle(&mut rng);

    let mut folds = vec![Vec::new(); k];
    for (position, index) in positives.into_iter().chain(negatives).enumerate() {
        folds[position % k].push(index);
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Indices in `0..n` that are not in `excluded`.
pub fn complement(n: usize, excluded: &[usize]) -> Vec<usize> {
    let mut mask = vec![false; n];
    for &i in excluded {
        if i < n {
            mask[i] = true;
        }
    }
    (0..n).filter(|&i| !mask[i]).collect()
}

/// Holds out a stratified `validation_split` share of the rows.
/// Returns `(train, validation)`; validation is empty when the split is zero
/// or a class is too small to spare a row.
pub fn train_validation_split(
    labels: &[bool],
    validation_split: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();
    for class in [true, false] {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        members.shuffle(&mut rng);
        let held = ((members.len() as f64) * validation_split).floor() as usize;
        let held = held.min(members.len().saturating_sub(1));
        validation.extend_from_slice(&members[..held]);
        train.extend_from_slice(&members[held..]);
    }
    train.sort_unstable();
    validation.sort_unstable();
    (train, validation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pos: usize, neg: usize) -> Vec<bool> {
        let mut l = vec![true; pos];
        l.extend(vec![false; neg]);
        l
    }

    #[test]
    fn test_folds_partition_rows_and_keep_both_classes() {
        let labels = labels(6, 9);
        let folds = stratified_k_fold(&labels, 3, 7).unwrap();
        assert_eq!(folds.len(), 3);
        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..15).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.iter().filter(|&&i| labels[i]).count(), 2);
            assert_eq!(fold.iter().filter(|&&i| !labels[i]).count(), 3);
        }
    }

    #[test]
    fn test_folds_are_deterministic_per_seed() {
        let labels = labels(10, 10);
        assert_eq!(
            stratified_k_fold(&labels, 5, 1).unwrap(),
            stratified_k_fold(&labels, 5, 1).unwrap()
        );
    }

    #[test]
    fn test_too_few_samples_per_class() {
        assert!(matches!(
            stratified_k_fold(&labels(1, 10), 2, 0),
            Err(LinkerError::Training(_))
        ));
        assert!(stratified_k_fold(&labels(5, 5), 1, 0).is_err());
    }

    #[test]
    fn test_complement() {
        assert_eq!(complement(5, &[1, 3]), vec![0, 2, 4]);
        assert_eq!(complement(2, &[]), vec![0, 1]);
    }

    #[test]
    fn test_train_validation_split_keeps_a_train_row_per_class() {
        let labels = labels(3, 30);
        let (train, validation) = train_validation_split(&labels, 0.33, 1984);
        assert_eq!(train.len() + validation.len(), 33);
        assert!(train.iter().any(|&i| labels[i]));
        assert!(train.iter().any(|&i| !labels[i]));
        assert_eq!(validation.iter().filter(|&&i| labels[i]).count(), 0);
        assert_eq!(validation.iter().filter(|&&i| !labels[i]).count(), 9);

        let (train, validation) = train_validation_split(&labels, 0.0, 1984);
        assert_eq!(train.len(), 33);
        assert!(validation.is_empty());
    }
}
