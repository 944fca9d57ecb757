// src/parse/json.rs

use serde_json::Value as Json;
use tracing::{trace, warn};

use super::{source_columns, Extractor};
use crate::error::ParseError;
use crate::table::{ColumnSpec, Table, Value};

/// Reads an array of record objects found at a dotted key path.
pub struct JsonExtractor {
    data_path: String,
    columns: Vec<ColumnSpec>,
}

impl JsonExtractor {
    pub fn new(data_path: &str, columns: &[ColumnSpec]) -> Self {
        Self {
            data_path: data_path.to_string(),
            columns: columns.to_vec(),
        }
    }
}

impl Extractor for JsonExtractor {
    fn extract(&self, body: &str) -> Result<Table, ParseError> {
        let doc: Json = serde_json::from_str(body.trim_start_matches('\u{feff}'))?;

        let records = lookup(&doc, &self.data_path)
            .ok_or_else(|| ParseError::MissingPath(self.data_path.clone()))?;
        let records = records.as_array().ok_or_else(|| ParseError::NotAnArray {
            path: self.data_path.clone(),
            found: kind_name(records),
        })?;

        let mut table = Table::new(source_columns(&self.columns));
        let mut seen = vec![false; self.columns.len()];

        for (index, record) in records.iter().enumerate() {
            if !record.is_object() {
                return Err(ParseError::NotAnObject {
                    index,
                    found: kind_name(record),
                });
            }
            let row: Vec<Value> = self
                .columns
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    let cell = lookup(record, &col.source);
                    seen[i] |= cell.is_some();
                    cell.map(scalar).unwrap_or(Value::Missing)
                })
                .collect();
            trace!(index, ?row, "record");
            table.rows.push(row);
        }

        if !records.is_empty() && !seen.iter().any(|&s| s) {
            let names: Vec<&str> = self.columns.iter().map(|c| c.source.as_str()).collect();
            return Err(ParseError::NoMappedFields(names.join(", ")));
        }
        for (col, found) in self.columns.iter().zip(&seen) {
            if !found && !records.is_empty() {
                warn!(field = %col.source, "mapped field absent from every record");
            }
        }

        Ok(table)
    }
}

/// Follow a dotted path; numeric segments index arrays. Empty path is the root.
fn lookup<'a>(root: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.')
        .filter(|seg| !seg.is_empty())
        .try_fold(root, |node, seg| match node {
            Json::Object(map) => map.get(seg),
            Json::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Render a JSON scalar as raw text; typing happens during normalization.
fn scalar(v: &Json) -> Value {
    match v {
        Json::Null => Value::Missing,
        Json::String(s) => Value::Text(s.clone()),
        Json::Number(n) => Value::Text(n.to_string()),
        Json::Bool(b) => Value::Text(b.to_string()),
        other => Value::Text(other.to_string()),
    }
}

fn kind_name(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{default_columns, ColumnKind};
    use anyhow::Result;

    /// Trimmed copy of a `v1/data` response for England and Wales.
    const DASHBOARD_FIXTURE: &str = r#"{
  "length": 3,
  "maxPageLimit": 2500,
  "totalRecords": 3,
  "data": [
    {"date": "2021-01-10", "areaName": "England", "areaCode": "E92000001",
     "newCasesByPublishDate": 46169, "cumCasesByPublishDate": 2659856,
     "newDeaths28DaysByPublishDate": 529, "cumDeaths28DaysByPublishDate": 71809},
    {"date": "2021-01-10", "areaName": "Wales", "areaCode": "W92000004",
     "newCasesByPublishDate": 1718, "cumCasesByPublishDate": 167578,
     "newDeaths28DaysByPublishDate": 17, "cumDeaths28DaysByPublishDate": null},
    {"date": "2021-01-09", "areaName": "Wales", "areaCode": "W92000004",
     "newCasesByPublishDate": 2167, "cumCasesByPublishDate": 165860,
     "newDeaths28DaysByPublishDate": 57, "cumDeaths28DaysByPublishDate": 4060}
  ],
  "requestPayload": {"structure": {}, "filters": [{"identifier": "areaType", "value": "nation"}], "page": 1}
}"#;

    #[test]
    fn golden_dashboard_payload() -> Result<()> {
        let table = JsonExtractor::new("data", &default_columns()).extract(DASHBOARD_FIXTURE)?;
        assert_eq!(
            table.column_names(),
            vec![
                "date",
                "areaName",
                "newCasesByPublishDate",
                "cumCasesByPublishDate",
                "newDeaths28DaysByPublishDate",
                "cumDeaths28DaysByPublishDate"
            ]
        );
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.rows[1],
            vec![
                Value::Text("2021-01-10".into()),
                Value::Text("Wales".into()),
                Value::Text("1718".into()),
                Value::Text("167578".into()),
                Value::Text("17".into()),
                Value::Missing,
            ]
        );
        Ok(())
    }

    #[test]
    fn nested_paths_and_array_indices() -> Result<()> {
        let body = r#"{"body": {"pages": [{"rows": [
            {"day": "2020-04-01", "area": {"name": "Scotland"}, "cases": 200}
        ]}]}}"#;
        let cols = vec![
            ColumnSpec::new("day", "date", ColumnKind::Date),
            ColumnSpec::new("area.name", "region", ColumnKind::Region),
            ColumnSpec::new("cases", "cases", ColumnKind::Integer),
        ];
        let table = JsonExtractor::new("body.pages.0.rows", &cols).extract(body)?;
        assert_eq!(table.rows[0][1], Value::Text("Scotland".into()));
        assert_eq!(table.rows[0][2], Value::Text("200".into()));
        Ok(())
    }

    #[test]
    fn root_array_with_empty_path() -> Result<()> {
        let cols = vec![
            ColumnSpec::new("d", "date", ColumnKind::Date),
            ColumnSpec::new("r", "region", ColumnKind::Region),
        ];
        let table = JsonExtractor::new("", &cols).extract(r#"[{"d": "2020-05-01", "r": "UK"}]"#)?;
        assert_eq!(table.len(), 1);
        Ok(())
    }

    #[test]
    fn shape_changes_are_reported() {
        let ex = JsonExtractor::new("data", &default_columns());

        assert!(matches!(ex.extract("<html>"), Err(ParseError::Json(_))));
        assert!(matches!(
            ex.extract(r#"{"rows": []}"#),
            Err(ParseError::MissingPath(p)) if p == "data"
        ));
        assert!(matches!(
            ex.extract(r#"{"data": {"date": "x"}}"#),
            Err(ParseError::NotAnArray { found: "an object", .. })
        ));
        assert!(matches!(
            ex.extract(r#"{"data": [1, 2]}"#),
            Err(ParseError::NotAnObject { index: 0, .. })
        ));
        assert!(matches!(
            ex.extract(r#"{"data": [{"foo": 1}]}"#),
            Err(ParseError::NoMappedFields(_))
        ));
    }

    #[test]
    fn empty_array_yields_empty_table() -> Result<()> {
        let table = JsonExtractor::new("data", &default_columns()).extract(r#"{"data": []}"#)?;
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), 6);
        Ok(())
    }
}
