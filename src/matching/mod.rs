// src/matching/mod.rs
pub mod date;
pub mod string_list;
pub mod url_list;
pub mod vectorizer;

use log::debug;

use crate::error::{LinkerError, LinkerResult};
use crate::models::{Cell, Value};
use crate::utils::constants::MAX_VALUES_PER_SIDE;

pub use date::{date_similarity, DateComparator};
pub use string_list::{StringAlgorithm, StringList};
pub use url_list::UrlList;
pub use vectorizer::{Analyzer, CountVectorizer};

/// A similarity function over two aligned columns, one score per row.
///
/// `left` holds knowledge base cells and `right` catalog cells for the
/// same candidate pairs. Rows where either side has no data get the
/// comparator's missing value.
pub trait CompareFeature: Send + Sync {
    /// Output column name
    fn label(&self) -> &str;
    fn left_on(&self) -> &str;
    fn right_on(&self) -> &str;
    fn compute(&self, left: &[&Cell], right: &[&Cell]) -> LinkerResult<Vec<f64>>;
}

pub(crate) fn ensure_aligned(left: &[&Cell], right: &[&Cell]) -> LinkerResult<()> {
    if left.len() != right.len() {
        return Err(LinkerError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(())
}

/// The first `MAX_VALUES_PER_SIDE` values of a cell.
pub(crate) fn bounded<'a>(cell: &'a Cell, column: &str) -> &'a [Value] {
    let values = cell.values();
    if values.len() > MAX_VALUES_PER_SIDE {
        debug!(
            "Column '{}' has {} values, comparing only the first {}",
            column,
            values.len(),
            MAX_VALUES_PER_SIDE
        );
        &values[..MAX_VALUES_PER_SIDE]
    } else {
        values
    }
}

/// Text values of a cell; any other value type is malformed in a text column.
pub(crate) fn texts<'a>(values: &'a [Value], column: &str) -> LinkerResult<Vec<&'a str>> {
    values
        .iter()
        .map(|value| {
            value.as_text().ok_or_else(|| {
                LinkerError::malformed(column, format!("expected text, found {:?}", value))
            })
        })
        .collect()
}
