// src/models/core.rs
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{LinkerError, LinkerResult};
use crate::models::date::DateValue;
use crate::utils::constants::{QID, TID};

/// One raw entity as delivered by a data source: column name to JSON value.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A single attribute value after preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(DateValue),
}

impl Value {
    /// Converts a scalar JSON value. Nulls become `None`; nested arrays or
    /// objects are malformed at this level.
    pub fn from_json(column: &str, raw: &serde_json::Value) -> LinkerResult<Option<Value>> {
        match raw {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => Ok(Some(Value::Text(s.clone()))),
            serde_json::Value::Bool(b) => Ok(Some(Value::Bool(*b))),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(|f| Some(Value::Number(f)))
                .ok_or_else(|| LinkerError::malformed(column, format!("number {} overflows", n))),
            other => Err(LinkerError::malformed(
                column,
                format!("expected a scalar, found {}", other),
            )),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateValue> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Textual rendering used for blocking keys and identifiers.
    pub fn to_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Date(d) => d.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Text(_) => 0,
            Value::Number(_) => 1,
            Value::Bool(_) => 2,
            Value::Date(_) => 3,
        }
    }

    /// Total order over values, used to deduplicate lists.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// A table cell: absent, a single value, or a set of values kept as a
/// sorted list without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Missing,
    Scalar(Value),
    List(Vec<Value>),
}

static MISSING_CELL: Cell = Cell::Missing;

impl Cell {
    /// Builds a cell from a bag of values: duplicates are removed, an empty
    /// bag is missing and a single value collapses to a scalar.
    pub fn from_values(mut values: Vec<Value>) -> Cell {
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        match values.len() {
            0 => Cell::Missing,
            1 => Cell::Scalar(values.remove(0)),
            _ => Cell::List(values),
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Scalar(_) => false,
            Cell::List(values) => values.is_empty(),
        }
    }

    /// All values of the cell; a scalar is a one-element list.
    pub fn values(&self) -> &[Value] {
        match self {
            Cell::Missing => &[],
            Cell::Scalar(v) => std::slice::from_ref(v),
            Cell::List(values) => values,
        }
    }
}

/// Column name to cell.
pub type Row = BTreeMap<String, Cell>;

/// Entities keyed by identifier, one row each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    rows: BTreeMap<String, Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, row: Row) {
        self.rows.insert(id.into(), row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn row(&self, id: &str) -> Option<&Row> {
        self.rows.get(id)
    }

    /// The cell at (id, column), missing when either is absent.
    pub fn cell(&self, id: &str, column: &str) -> &Cell {
        self.rows
            .get(id)
            .and_then(|row| row.get(column))
            .unwrap_or(&MISSING_CELL)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Row)> {
        self.rows.iter().map(|(id, row)| (id.as_str(), row))
    }

    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .values()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }
}

/// Whether a dataset is built to train a model or to be classified by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Training,
    Classification,
}

impl Goal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Goal::Training => "training",
            Goal::Classification => "classification",
        }
    }
}

impl FromStr for Goal {
    type Err = LinkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "training" => Ok(Goal::Training),
            "classification" => Ok(Goal::Classification),
            _ => Err(LinkerError::InvalidGoal {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the linkage a table describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    KnowledgeBase,
    Catalog,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::KnowledgeBase => "wikidata",
            Side::Catalog => "catalog",
        }
    }

    /// Column carrying the entity identifier on this side.
    pub fn id_column(&self) -> &'static str {
        match self {
            Side::KnowledgeBase => QID,
            Side::Catalog => TID,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_goal_parsing() {
        assert_eq!("training".parse::<Goal>().unwrap(), Goal::Training);
        assert_eq!(
            " Classification ".parse::<Goal>().unwrap(),
            Goal::Classification
        );
        let err = "evaluation".parse::<Goal>().unwrap_err();
        assert!(matches!(err, LinkerError::InvalidGoal { .. }));
    }

    #[test]
    fn test_cell_from_values_dedups_and_collapses() {
        let cell = Cell::from_values(vec![text("b"), text("a"), text("b")]);
        assert_eq!(cell, Cell::List(vec![text("a"), text("b")]));

        let cell = Cell::from_values(vec![text("only"), text("only")]);
        assert_eq!(cell, Cell::Scalar(text("only")));

        assert!(Cell::from_values(vec![]).is_missing());
    }

    #[test]
    fn test_table_cell_lookup_defaults_to_missing() {
        let mut table = Table::new();
        let mut row = Row::new();
        row.insert("name".to_string(), Cell::Scalar(text("Alan Turing")));
        table.insert("Q7251", row);

        assert_eq!(table.cell("Q7251", "name").values(), &[text("Alan Turing")]);
        assert!(table.cell("Q7251", "url").is_missing());
        assert!(table.cell("Q1", "name").is_missing());
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(Value::Number(1234.0).to_text(), "1234");
        assert_eq!(Value::Number(0.5).to_text(), "0.5");
        assert_eq!(text("x").to_text(), "x");
    }

    #[test]
    fn test_value_from_json_rejects_nested() {
        let nested = serde_json::json!({"a": 1});
        assert!(Value::from_json("name", &nested).is_err());
        assert_eq!(
            Value::from_json("name", &serde_json::Value::Null).unwrap(),
            None
        );
    }
}
