// src/matching/date.rs
use crate::error::{LinkerError, LinkerResult};
use crate::matching::{bounded, ensure_aligned, CompareFeature};
use crate::models::{Cell, DatePrecision, DateValue, Value};
use crate::utils::constants::FEATURE_MISSING_VALUE;

/// Precision-aware similarity of two dates.
///
/// Both dates are compared down to the coarser of their precisions, never
/// finer than a day. Year, month and day are matched in order and the score
/// is the share of leading components that agree, so a month is only
/// credited when the year matched.
pub fn date_similarity(a: &DateValue, b: &DateValue) -> f64 {
    let depth = a
        .precision()
        .min(b.precision())
        .min(DatePrecision::Day)
        .depth();
    let (ca, cb) = (a.calendar_components(), b.calendar_components());
    let matched = (0..depth).take_while(|&i| ca[i] == cb[i]).count();
    matched as f64 / depth as f64
}

/// Best date similarity over the cross product of two date lists.
#[derive(Debug, Clone)]
pub struct DateComparator {
    left_on: String,
    right_on: String,
    label: String,
    missing_value: f64,
}

impl DateComparator {
    pub fn new(left_on: &str, right_on: &str, label: &str) -> Self {
        Self {
            left_on: left_on.to_string(),
            right_on: right_on.to_string(),
            label: label.to_string(),
            missing_value: FEATURE_MISSING_VALUE,
        }
    }

    pub fn with_missing_value(mut self, missing_value: f64) -> Self {
        self.missing_value = missing_value;
        self
    }

    fn dates<'a>(values: &'a [Value], column: &str) -> LinkerResult<Vec<&'a DateValue>> {
        values
            .iter()
            .map(|value| {
                value.as_date().ok_or_else(|| {
                    LinkerError::malformed(column, format!("expected a date, found {:?}", value))
                })
            })
            .collect()
    }

    fn score(&self, left: &Cell, right: &Cell) -> LinkerResult<f64> {
        let a = Self::dates(bounded(left, &self.left_on), &self.left_on)?;
        let b = Self::dates(bounded(right, &self.right_on), &self.right_on)?;
        let best = a
            .iter()
            .flat_map(|x| b.iter().map(move |y| date_similarity(x, y)))
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))));
        Ok(best.unwrap_or(self.missing_value))
    }
}

impl CompareFeature for DateComparator {
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

    fn date(raw: &str, precision: DatePrecision) -> DateValue {
        DateValue::parse(raw, "date", precision).unwrap()
    }

    #[test]
    fn test_exact_day_match() {
        let a = date("1912-06-23", DatePrecision::Day);
        assert_eq!(date_similarity(&a, &a), 1.0);
    }

    #[test]
    fn test_cascading_components() {
        let a = date("1912-06-23", DatePrecision::Day);
        let same_month = date("1912-06-01", DatePrecision::Day);
        let same_year = date("1912-07-23", DatePrecision::Day);
        let other_year = date("1913-06-23", DatePrecision::Day);
        assert!((date_similarity(&a, &same_month) - 2.0 / 3.0).abs() < 1e-12);
        assert!((date_similarity(&a, &same_year) - 1.0 / 3.0).abs() < 1e-12);
        // Month and day agree but the year does not
        assert_eq!(date_similarity(&a, &other_year), 0.0);
    }

    #[test]
    fn test_coarser_precision_wins() {
        let day = date("1912-06-23", DatePrecision::Day);
        let year = date("1912", DatePrecision::Year);
        assert_eq!(date_similarity(&day, &year), 1.0);

        let seconds = date("1912-06-23T10:11:12", DatePrecision::Second);
        let other_time = date("1912-06-23T22:00:00", DatePrecision::Second);
        assert_eq!(date_similarity(&seconds, &other_time), 1.0);
    }

    #[test]
    fn test_best_over_lists_and_missing() {
        let cmp = DateComparator::new("date_of_birth", "date_of_birth", "birth_date");
        let left = Cell::from_values(vec![
            Value::Date(date("1900", DatePrecision::Year)),
            Value::Date(date("1912-06-23", DatePrecision::Day)),
        ]);
        let right = Cell::Scalar(Value::Date(date("1912-06-23", DatePrecision::Day)));
        let missing = Cell::Missing;
        let scores = cmp
            .compute(&[&left, &missing], &[&right, &right])
            .unwrap();
        assert_eq!(scores, vec![1.0, 0.0]);
    }

    #[test]
    fn test_text_in_date_column_is_malformed() {
        let cmp = DateComparator::new("date_of_birth", "date_of_birth", "birth_date");
        let text = Cell::Scalar(Value::Text("1912".to_string()));
        assert!(cmp.compute(&[&text], &[&text]).is_err());
    }
}
