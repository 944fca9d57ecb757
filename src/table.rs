// src/table.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical date rendering used everywhere after normalization.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// How a mapped column is typed once normalized.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Record date; part of the row key.
    Date,
    /// Area name; part of the row key.
    Region,
    /// Non-negative count.
    Integer,
    Text,
}

/// One entry of the extraction mapping.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct ColumnSpec {
    /// JSON field path inside a record, or HTML header text.
    pub source: String,
    /// Output column name. Defaults to `source`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: ColumnKind,
}

fn default_kind() -> ColumnKind {
    ColumnKind::Text
}

impl ColumnSpec {
    pub fn new(source: &str, name: &str, kind: ColumnKind) -> Self {
        Self {
            source: source.to_string(),
            name: Some(name.to_string()),
            kind,
        }
    }

    pub fn output_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.source)
    }
}

/// Mapping for the UK coronavirus dashboard `v1/data` endpoint.
pub fn default_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("date", "date", ColumnKind::Date),
        ColumnSpec::new("areaName", "region", ColumnKind::Region),
        ColumnSpec::new("newCasesByPublishDate", "new_cases", ColumnKind::Integer),
        ColumnSpec::new("cumCasesByPublishDate", "cumulative_cases", ColumnKind::Integer),
        ColumnSpec::new("newDeaths28DaysByPublishDate", "new_deaths", ColumnKind::Integer),
        ColumnSpec::new(
            "cumDeaths28DaysByPublishDate",
            "cumulative_deaths",
            ColumnKind::Integer,
        ),
    ]
}

#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// A single cell.
#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub enum Value {
    /// Unconverted or free-form text.
    Text(String),
    Date(NaiveDate),
    Integer(u64),
    Missing,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Missing => Ok(()),
        }
    }
}

/// Rows sharing one column schema.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of the first column of `kind`.
    pub fn position_of(&self, kind: ColumnKind) -> Option<usize> {
        self.columns.iter().position(|c| c.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_render_for_csv() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 7).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2021-03-07");
        assert_eq!(Value::Integer(1234).to_string(), "1234");
        assert_eq!(Value::Missing.to_string(), "");
        assert_eq!(Value::Text("Wales".into()).to_string(), "Wales");
    }

    #[test]
    fn default_mapping_has_one_key_of_each_kind() {
        let cols = default_columns();
        let dates = cols.iter().filter(|c| c.kind == ColumnKind::Date).count();
        let regions = cols.iter().filter(|c| c.kind == ColumnKind::Region).count();
        assert_eq!((dates, regions), (1, 1));
        assert_eq!(cols[1].output_name(), "region");
    }

    #[test]
    fn column_spec_name_defaults_to_source() -> anyhow::Result<()> {
        let spec: ColumnSpec = serde_yaml::from_str("source: hospitalCases\nkind: integer")?;
        assert_eq!(spec.output_name(), "hospitalCases");
        assert_eq!(spec.kind, ColumnKind::Integer);

        let text: ColumnSpec = serde_yaml::from_str("source: areaCode")?;
        assert_eq!(text.kind, ColumnKind::Text);
        Ok(())
    }
}
