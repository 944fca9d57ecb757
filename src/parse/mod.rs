// src/parse/mod.rs

pub mod html;
pub mod json;

use tracing::{debug, info, instrument};

use crate::config::{Config, SourceFormat};
use crate::error::ParseError;
use crate::fetch::RawResponse;
use crate::table::{Column, ColumnSpec, Table};

pub use html::HtmlExtractor;
pub use json::JsonExtractor;

/// Turns a response body into a table whose columns follow a fixed mapping.
pub trait Extractor {
    fn extract(&self, body: &str) -> Result<Table, ParseError>;
}

/// Shape of a response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentShape {
    Json,
    Html,
}

/// Pick the shape: explicit setting, then content type, then first byte.
pub fn detect_shape(
    format: SourceFormat,
    content_type: Option<&str>,
    body: &str,
) -> Result<ContentShape, ParseError> {
    match format {
        SourceFormat::Json => return Ok(ContentShape::Json),
        SourceFormat::Html => return Ok(ContentShape::Html),
        SourceFormat::Auto => {}
    }

    if let Some(ct) = content_type.map(str::to_ascii_lowercase) {
        if ct.contains("json") {
            return Ok(ContentShape::Json);
        }
        if ct.contains("html") {
            return Ok(ContentShape::Html);
        }
    }

    match body.trim_start_matches('\u{feff}').trim_start().chars().next() {
        Some('{') | Some('[') => Ok(ContentShape::Json),
        Some('<') => Ok(ContentShape::Html),
        _ => Err(ParseError::UnknownFormat(content_type.map(str::to_string))),
    }
}

/// Columns of an extracted table: the mapping sources, in mapping order.
pub(crate) fn source_columns(columns: &[ColumnSpec]) -> Vec<Column> {
    columns
        .iter()
        .map(|c| Column {
            name: c.source.clone(),
            kind: c.kind,
        })
        .collect()
}

/// Extract a table from `resp` using the extractor that matches its shape.
#[instrument(level = "info", skip_all, fields(url = %resp.url))]
pub fn parse_response(resp: &RawResponse, cfg: &Config) -> Result<Table, ParseError> {
    let shape = detect_shape(cfg.format, resp.content_type.as_deref(), &resp.body)?;
    debug!(?shape, "detected content shape");

    let extractor: Box<dyn Extractor> = match shape {
        ContentShape::Json => Box::new(JsonExtractor::new(&cfg.data_path, &cfg.columns)),
        ContentShape::Html => Box::new(HtmlExtractor::new(&cfg.table_selector, &cfg.columns)),
    };
    let table = extractor.extract(&resp.body)?;
    info!(rows = table.len(), columns = table.columns.len(), "parsed");
    Ok(table)
}
