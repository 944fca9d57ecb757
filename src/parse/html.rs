// src/parse/html.rs

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};

use super::{source_columns, Extractor};
use crate::error::ParseError;
use crate::table::{ColumnSpec, Table, Value};

/// Reads the first table matching a CSS selector, mapping columns by header text.
pub struct HtmlExtractor {
    table_selector: String,
    columns: Vec<ColumnSpec>,
}

impl HtmlExtractor {
    pub fn new(table_selector: &str, columns: &[ColumnSpec]) -> Self {
        Self {
            table_selector: table_selector.to_string(),
            columns: columns.to_vec(),
        }
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::Selector(css.to_string()))
}

/// True when the nearest enclosing `<table>` of `el` is `table`.
fn belongs_to(el: ElementRef<'_>, table: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
        .map_or(false, |a| a.id() == table.id())
}

/// The `<th>`/`<td>` children of a row, ignoring anything nested deeper.
fn row_cells(tr: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "th" | "td"))
        .collect()
}

fn has_data_cell(cells: &[ElementRef<'_>]) -> bool {
    cells.iter().any(|c| c.value().name() == "td")
}

/// Element text with whitespace runs collapsed to single spaces.
fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

impl Extractor for HtmlExtractor {
    fn extract(&self, body: &str) -> Result<Table, ParseError> {
        let doc = Html::parse_document(body);
        let table_sel = selector(&self.table_selector)?;
        let row_sel = selector("tr")?;

        let table_el = doc
            .select(&table_sel)
            .next()
            .ok_or_else(|| ParseError::NoTable(self.table_selector.clone()))?;

        // Rows of nested tables belong to those tables, not this one.
        let mut rows = table_el
            .select(&row_sel)
            .filter(|tr| belongs_to(*tr, table_el))
            .map(row_cells);

        // Header: first row made only of <th> cells.
        let headers: Vec<String> = rows
            .by_ref()
            .find(|cells| !cells.is_empty() && !has_data_cell(cells))
            .map(|cells| cells.into_iter().map(cell_text).collect())
            .ok_or_else(|| ParseError::NoHeader(self.table_selector.clone()))?;
        debug!(?headers, "table headers");

        let positions = self
            .columns
            .iter()
            .map(|col| {
                headers
                    .iter()
                    .position(|h| h.eq_ignore_ascii_case(col.source.trim()))
                    .ok_or_else(|| ParseError::MissingColumn {
                        column: col.source.clone(),
                        headers: headers.join(", "),
                    })
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let mut table = Table::new(source_columns(&self.columns));
        for cells in rows.filter(|cells| has_data_cell(cells)) {
            let cells: Vec<String> = cells.into_iter().map(cell_text).collect();
            let row: Vec<Value> = positions
                .iter()
                .map(|&i| cells.get(i).cloned().map(Value::Text).unwrap_or(Value::Missing))
                .collect();
            trace!(?row, "row");
            table.rows.push(row);
        }

        Ok(table)
    }
}
