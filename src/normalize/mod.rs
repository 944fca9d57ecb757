// src/normalize/mod.rs

pub mod dates;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use crate::error::DataShapeError;
use crate::table::{Column, ColumnKind, ColumnSpec, Table, Value};

pub use dates::{parse_date, DEFAULT_DATE_FORMATS};

/// `12,345,678` style thousands grouping.
static GROUPED_INT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})+$").expect("valid grouped integer regex"));

/// What normalization did to a table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub input_rows: usize,
    pub dropped_invalid: usize,
    pub duplicates_removed: usize,
}

/// Trim whitespace and strip every layer of outer quotes.
pub fn clean_str(raw: &str) -> String {
    let mut s = raw.trim();
    while s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s = s[1..s.len() - 1].trim();
    }
    s.to_string()
}

/// Parse a count. Negative, fractional, empty or non-numeric text is `None`.
pub fn parse_count(raw: &str) -> Option<u64> {
    let s = clean_str(raw);
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<u64>() {
        return Some(n);
    }
    if GROUPED_INT_RE.is_match(&s) {
        return s.replace(',', "").parse().ok();
    }
    // JSON sources sometimes render counts as `12.0`.
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < 9.0e15 => Some(f as u64),
        _ => None,
    }
}

fn coerce(value: Value, kind: ColumnKind, date_formats: &[String]) -> Value {
    match (kind, value) {
        (_, Value::Missing) => Value::Missing,

        (ColumnKind::Date, Value::Date(d)) => Value::Date(d),
        (ColumnKind::Date, Value::Text(s)) => parse_date(&clean_str(&s), date_formats)
            .map(Value::Date)
            .unwrap_or(Value::Missing),
        (ColumnKind::Date, Value::Integer(_)) => Value::Missing,

        (ColumnKind::Integer, Value::Integer(n)) => Value::Integer(n),
        (ColumnKind::Integer, Value::Text(s)) => {
            parse_count(&s).map(Value::Integer).unwrap_or(Value::Missing)
        }
        (ColumnKind::Integer, Value::Date(_)) => Value::Missing,

        (ColumnKind::Region | ColumnKind::Text, v) => {
            let s = clean_str(&v.to_string());
            if s.is_empty() {
                Value::Missing
            } else {
                Value::Text(s)
            }
        }
    }
}

/// Pair each recognizable table column with its mapping entry, in input order.
///
/// A header that lists the mapping's sources, or its output names, in
/// mapping order is matched position by position. Any other header is
/// matched by name, output name first, each entry used at most once.
pub(crate) fn map_columns<'a>(
    table_columns: &[Column],
    columns: &'a [ColumnSpec],
) -> Vec<(usize, &'a ColumnSpec)> {
    let names: Vec<&str> = table_columns.iter().map(|c| c.name.as_str()).collect();
    let sources: Vec<&str> = columns.iter().map(|c| c.source.as_str()).collect();
    let outputs: Vec<&str> = columns.iter().map(ColumnSpec::output_name).collect();
    if names == sources || names == outputs {
        return columns.iter().enumerate().collect();
    }

    let mut used = vec![false; columns.len()];
    let mut mapped = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let found = columns
            .iter()
            .enumerate()
            .find(|(j, c)| !used[*j] && c.output_name() == *name)
            .or_else(|| {
                columns
                    .iter()
                    .enumerate()
                    .find(|(j, c)| !used[*j] && c.source == *name)
            });
        match found {
            Some((j, spec)) => {
                used[j] = true;
                mapped.push((i, spec));
            }
            None => debug!(column = %name, "dropping unmapped column"),
        }
    }
    mapped
}

/// Rename, type, filter and deduplicate `table` according to `columns`.
///
/// Rows without a valid date and region are dropped. Rows sharing a
/// (date, region) key collapse to the latest-seen one, which keeps its
/// position. Only an input with no rows or no recognizable columns fails.
#[instrument(level = "info", skip_all, fields(rows = table.len()))]
pub fn normalize(
    table: Table,
    columns: &[ColumnSpec],
    date_formats: &[String],
) -> Result<(Table, NormalizeStats), DataShapeError> {
    let width = table.columns.len();
    for (row, values) in table.rows.iter().enumerate() {
        if values.len() != width {
            return Err(DataShapeError::RaggedRow {
                row,
                found: values.len(),
                expected: width,
            });
        }
    }

    let kept = map_columns(&table.columns, columns);

    if kept.is_empty() {
        return Err(DataShapeError::NoColumns);
    }
    if table.rows.is_empty() {
        return Err(DataShapeError::NoRows);
    }

    let out_columns: Vec<Column> = kept
        .iter()
        .map(|(_, spec)| Column {
            name: spec.output_name().to_string(),
            kind: spec.kind,
        })
        .collect();
    let mut out = Table::new(out_columns);

    let date_idx = out.position_of(ColumnKind::Date);
    let region_idx = out.position_of(ColumnKind::Region);
    let (date_idx, region_idx) = match (date_idx, region_idx) {
        (Some(d), Some(r)) => (d, r),
        (None, _) => return Err(DataShapeError::MissingKeyColumn("date")),
        (_, None) => return Err(DataShapeError::MissingKeyColumn("region")),
    };

    let mut stats = NormalizeStats {
        input_rows: table.rows.len(),
        ..Default::default()
    };

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(table.rows.len());
    for mut values in table.rows {
        let row: Vec<Value> = kept
            .iter()
            .map(|&(i, spec)| {
                coerce(
                    std::mem::replace(&mut values[i], Value::Missing),
                    spec.kind,
                    date_formats,
                )
            })
            .collect();

        let valid = matches!(row[date_idx], Value::Date(_))
            && matches!(&row[region_idx], Value::Text(s) if !s.is_empty());
        if valid {
            rows.push(row);
        } else {
            stats.dropped_invalid += 1;
        }
    }

    // Latest-seen wins: walk backwards keeping the first of each key.
    let mut seen = HashSet::new();
    let mut deduped = Vec::with_capacity(rows.len());
    for row in rows.into_iter().rev() {
        let key = (row[date_idx].clone(), row[region_idx].clone());
        if seen.insert(key) {
            deduped.push(row);
        } else {
            stats.duplicates_removed += 1;
        }
    }
    deduped.reverse();
    out.rows = deduped;

    if stats.dropped_invalid > 0 {
        warn!(
            dropped = stats.dropped_invalid,
            "dropped rows without a valid date or region"
        );
    }
    if out.is_empty() {
        warn!("no valid rows left after normalization");
    }
    info!(
        kept = out.len(),
        duplicates = stats.duplicates_removed,
        "normalized"
    );
    Ok((out, stats))
}
