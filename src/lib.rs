//! Fetch UK COVID-19 dashboard statistics and save them as CSV.
//!
//! One run is a straight line: [`config`] → [`fetch`] → [`parse`] →
//! [`normalize`] → [`write`], sequenced by [`pipeline::Pipeline`].

pub mod config;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod table;
pub mod write;

pub use config::Config;
pub use error::{PipelineError, Stage};
pub use pipeline::{Pipeline, RunSummary};
pub use table::{Column, ColumnKind, ColumnSpec, Table, Value};
