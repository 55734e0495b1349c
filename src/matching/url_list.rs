// src/matching/url_list.rs
use crate::error::LinkerResult;
use crate::matching::{bounded, ensure_aligned, texts, CompareFeature};
use crate::models::Cell;
use crate::utils::constants::FEATURE_MISSING_VALUE;

/// Exact match over URL lists: the average of agree/disagree values over
/// the cross product of both sides.
#[derive(Debug, Clone)]
pub struct UrlList {
    left_on: String,
    right_on: String,
    label: String,
    agree_value: f64,
    disagree_value: f64,
    missing_value: f64,
}

impl UrlList {
    pub fn new(left_on: &str, right_on: &str, label: &str) -> Self {
        Self {
            left_on: left_on.to_string(),
            right_on: right_on.to_string(),
            label: label.to_string(),
            agree_value: 1.0,
            disagree_value: 0.0,
            missing_value: FEATURE_MISSING_VALUE,
        }
    }

    pub fn with_missing_value(mut self, missing_value: f64) -> Self {
        self.missing_value = missing_value;
        self
    }

    pub fn with_values(mut self, agree_value: f64, disagree_value: f64) -> Self {
        self.agree_value = agree_value;
        self.disagree_value = disagree_value;
        self
    }

    fn score(&self, left: &Cell, right: &Cell) -> LinkerResult<f64> {
        let a = texts(bounded(left, &self.left_on), &self.left_on)?;
        let b = texts(bounded(right, &self.right_on), &self.right_on)?;
        if a.is_empty() || b.is_empty() {
            return Ok(self.missing_value);
        }
        let mut total = 0.0;
        for x in &a {
            for y in &b {
                total += if x.trim() == y.trim() {
                    self.agree_value
                } else {
                    self.disagree_value
                };
            }
        }
        Ok(total / (a.len() * b.len()) as f64)
    }
}

impl CompareFeature for UrlList {
    fn label(&self) -> &str {
        &self.label
    }

    fn left_on(&self) -> &str {
        &self.left_on
    }

    fn right_on(&self) -> &str {
        &self.right_on
    }

    fn compute(&self, left: &[&Cell], right: &[&Cell]) -> LinkerResult<Vec<f64>> {
        ensure_aligned(left, right)?;
        left.iter()
            .zip(right)
            .map(|(l, r)| self.score(l, r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn urls(values: &[&str]) -> Cell {
        Cell::from_values(values.iter().map(|v| Value::Text(v.to_string())).collect())
    }

    #[test]
    fn test_agree_disagree_and_missing() {
        let cmp = UrlList::new("url", "url", "url_exact");
        let left = [urls(&["http://x"]), urls(&["http://x"]), urls(&[])];
        let right = [urls(&["http://x"]), urls(&["http://y"]), urls(&["http://x"])];
        let scores = cmp
            .compute(&left.iter().collect::<Vec<_>>(), &right.iter().collect::<Vec<_>>())
            .unwrap();
        assert_eq!(scores, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cross_product_average() {
        let cmp = UrlList::new("url", "url", "url_exact");
        let left = urls(&["http://a", "http://b"]);
        let right = urls(&["http://a"]);
        assert_eq!(cmp.compute(&[&left], &[&right]).unwrap(), vec![0.5]);
    }

    #[test]
    fn test_custom_missing_value_and_mismatch() {
        let cmp = UrlList::new("url", "url", "url_exact").with_missing_value(-1.0);
        let empty = Cell::Missing;
        assert_eq!(cmp.compute(&[&empty], &[&empty]).unwrap(), vec![-1.0]);
        assert!(cmp.compute(&[&empty], &[]).is_err());
    }
}
