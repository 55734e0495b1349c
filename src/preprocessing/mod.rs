// src/preprocessing/mod.rs
pub mod tokenize;

use log::{debug, info, warn};
use serde_json::Value as Json;
use std::collections::BTreeMap;

use crate::error::{LinkerError, LinkerResult};
use crate::models::{Cell, DatePrecision, DateValue, Goal, RawRecord, Row, Side, Table, Value};
use crate::utils::constants::{
    DATE_COLUMNS, DESCRIPTION, TID, TOKENIZED_COLUMNS, URL, URL_TOKENS,
};

pub use tokenize::{normalize, tokenize, tokenize_url};

/// Normalizes raw rows from one side into a table keyed by identifier.
///
/// Rows sharing an identifier are merged column by column with set
/// semantics. Dates are merged with their precision column, descriptions
/// are joined, name/pseudonym/URL token columns are derived when the
/// source did not provide them, and single-value lists collapse to scalars.
/// With the training goal, catalog rows also get a `tid` column holding
/// their own identifier, which blocking uses as its key.
pub fn preprocess<I>(side: Side, goal: Goal, records: I) -> LinkerResult<Table>
where
    I: IntoIterator<Item = RawRecord>,
{
    let id_column = side.id_column();
    info!("Preprocessing {} rows for {} ...", side, goal);

    let mut grouped: BTreeMap<String, BTreeMap<String, Vec<Value>>> = BTreeMap::new();
    let mut raw_count = 0usize;
    for record in records {
        raw_count += 1;
        let id = record_id(&record, id_column)?;
        let columns = grouped.entry(id).or_default();
        for (column, values) in record_values(&record, id_column)? {
            columns.entry(column).or_default().extend(values);
        }
    }
    debug!(
        "Aggregated {} raw {} rows into {} entities",
        raw_count,
        side,
        grouped.len()
    );

    let mut table = Table::new();
    for (id, columns) in grouped {
        let mut row = Row::new();
        for (column, values) in columns {
            let cell = if column == DESCRIPTION {
                join_descriptions(values)
            } else {
                Cell::from_values(values)
            };
            if !cell.is_missing() {
                row.insert(column, cell);
            }
        }

        if goal == Goal::Training && side == Side::Catalog {
            row.insert(TID.to_string(), Cell::Scalar(Value::Text(id.clone())));
        }
        derive_token_columns(&mut row);
        table.insert(id, row);
    }

    info!(
        "{} preprocessing done: {} raw rows, {} entities",
        side,
        raw_count,
        table.len()
    );
    Ok(table)
}

fn record_id(record: &RawRecord, id_column: &str) -> LinkerResult<String> {
    match record.get(id_column) {
        Some(Json::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        // Catalog identifiers are always handled as strings
        Some(Json::Number(n)) => Ok(n.to_string()),
        other => Err(LinkerError::malformed(
            id_column,
            format!("row without a usable identifier: {:?}", other),
        )),
    }
}

fn is_precision_column(column: &str) -> bool {
    DATE_COLUMNS.iter().any(|(_, precision)| *precision == column)
}

/// Flattens one raw record into (column, values) pairs, skipping the
/// identifier and precision columns.
fn record_values(record: &RawRecord, id_column: &str) -> LinkerResult<Vec<(String, Vec<Value>)>> {
    let mut out = Vec::with_capacity(record.len());
    for (column, raw) in record {
        if column == id_column || is_precision_column(column) {
            continue;
        }
        let values = match DATE_COLUMNS.iter().find(|(date, _)| *date == column) {
            Some((_, precision_column)) => {
                parse_dates(column, raw, record.get(*precision_column))
            }
            None => flatten(column, raw)?,
        };
        let values = if column == TID {
            values
                .into_iter()
                .map(|v| Value::Text(v.to_text()))
                .collect()
        } else {
            values
        };
        out.push((column.clone(), values));
    }
    Ok(out)
}

fn flatten(column: &str, raw: &Json) -> LinkerResult<Vec<Value>> {
    match raw {
        Json::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                if let Some(value) = Value::from_json(column, item)? {
                    values.push(value);
                }
            }
            Ok(values)
        }
        scalar => Ok(Value::from_json(column, scalar)?.into_iter().collect()),
    }
}

/// Merges a date column with its precision. Accepted shapes: a date string
/// with a scalar or aligned list precision, `[date, precision]` pairs, and
/// `{"value", "precision"}` objects. Null or unparseable dates are skipped.
fn parse_dates(column: &str, raw: &Json, precision: Option<&Json>) -> Vec<Value> {
    let mut entries: Vec<(&Json, Option<&Json>)> = Vec::new();
    match raw {
        Json::Null => {}
        Json::Array(items) if precision.is_none() && is_date_pair(items) => {
            push_date_entry(raw, None, &mut entries)
        }
        Json::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let aligned = match precision {
                    Some(Json::Array(ps)) => ps.get(i),
                    other => other,
                };
                push_date_entry(item, aligned, &mut entries);
            }
        }
        single => push_date_entry(single, precision, &mut entries),
    }

    let mut dates = Vec::with_capacity(entries.len());
    for (date, precision) in entries {
        let (Some(date), Some(precision)) = (date.as_str(), precision.and_then(parse_precision))
        else {
            debug!(
                "Skipping null value in '{}'. Date: {} - Precision: {:?}",
                column, date, precision
            );
            continue;
        };
        match DateValue::parse(date, column, precision) {
            Ok(parsed) => dates.push(Value::Date(parsed)),
            Err(e) => warn!("Skipping date that can't be parsed: {}. Reason: {}", date, e),
        }
    }
    dates
}

fn is_date_pair(items: &[Json]) -> bool {
    items.len() == 2 && items[0].is_string() && items[1].is_number()
}

fn push_date_entry<'a>(
    item: &'a Json,
    precision: Option<&'a Json>,
    entries: &mut Vec<(&'a Json, Option<&'a Json>)>,
) {
    match item {
        Json::Array(pair) if pair.len() == 2 => entries.push((&pair[0], Some(&pair[1]))),
        Json::Object(map) => {
            if let Some(value) = map.get("value") {
                entries.push((value, map.get("precision")));
            }
        }
        other => entries.push((other, precision)),
    }
}

fn parse_precision(raw: &Json) -> Option<DatePrecision> {
    match raw {
        Json::Number(n) => n.as_i64().map(DatePrecision::from_wikidata),
        Json::String(s) => match s.trim().to_lowercase().as_str() {
            "year" => Some(DatePrecision::Year),
            "month" => Some(DatePrecision::Month),
            "day" => Some(DatePrecision::Day),
            "hour" => Some(DatePrecision::Hour),
            "minute" => Some(DatePrecision::Minute),
            "second" => Some(DatePrecision::Second),
            numeric => numeric.parse::<i64>().ok().map(DatePrecision::from_wikidata),
        },
        _ => None,
    }
}

fn join_descriptions(values: Vec<Value>) -> Cell {
    let joined = Cell::from_values(values)
        .values()
        .iter()
        .map(Value::to_text)
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        Cell::Missing
    } else {
        Cell::Scalar(Value::Text(joined))
    }
}

fn token_cell(cell: &Cell, tokenizer: fn(&str) -> Vec<String>) -> Cell {
    let joined = cell
        .values()
        .iter()
        .filter_map(Value::as_text)
        .map(|text| tokenizer(text).join(" "))
        .filter(|tokens| !tokens.is_empty())
        .map(Value::Text)
        .collect();
    Cell::from_values(joined)
}

fn derive_token_columns(row: &mut Row) {
    let mut derived = Vec::new();
    for (source, target) in TOKENIZED_COLUMNS {
        if row.contains_key(target) {
            continue;
        }
        if let Some(cell) = row.get(source) {
            derived.push((target, token_cell(cell, tokenize)));
        }
    }
    if !row.contains_key(URL_TOKENS) {
        if let Some(cell) = row.get(URL) {
            derived.push((URL_TOKENS, token_cell(cell, tokenize_url)));
        }
    }
    for (column, cell) in derived {
        if !cell.is_missing() {
            row.insert(column.to_string(), cell);
        }
    }
}
