// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Which pipeline stage an error came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Config,
    Fetch,
    Parse,
    Normalize,
    Write,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Normalize => "normalize",
            Stage::Write => "write",
        }
    }

    /// Process exit status reported for a failure in this stage.
    pub fn exit_code(&self) -> u8 {
        match self {
            Stage::Config => 2,
            Stage::Fetch => 3,
            Stage::Parse => 4,
            Stage::Normalize => 5,
            Stage::Write => 6,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing environment variable(s): {0}")]
    MissingEnv(String),

    #[error("required setting `{0}` is missing or empty")]
    MissingKey(&'static str),

    #[error("setting `{key}` is invalid: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid request header `{0}`")]
    InvalidHeader(String),

    #[error("building HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("GET {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("GET {url} failed")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned HTTP {status}: {snippet}")]
    Status {
        url: String,
        status: u16,
        snippet: String,
    },

    #[error("reading body from {url}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot tell whether the response is JSON or HTML (content-type {0:?})")]
    UnknownFormat(Option<String>),

    #[error("response is not valid JSON")]
    Json(#[from] serde_json::Error),

    #[error("JSON path `{0}` not found in response")]
    MissingPath(String),

    #[error("JSON path `{path}` holds {found}, expected an array of records")]
    NotAnArray { path: String, found: &'static str },

    #[error("record {index} is {found}, expected an object")]
    NotAnObject { index: usize, found: &'static str },

    #[error("none of the mapped fields ({0}) appear in any record")]
    NoMappedFields(String),

    #[error("invalid CSS selector `{0}`")]
    Selector(String),

    #[error("no element matches `{0}`")]
    NoTable(String),

    #[error("table `{0}` has no header row")]
    NoHeader(String),

    #[error("column `{column}` not found in table headers [{headers}]")]
    MissingColumn { column: String, headers: String },
}

#[derive(Debug, Error)]
pub enum DataShapeError {
    #[error("extracted table has no rows")]
    NoRows,

    #[error("extracted table has no recognizable columns")]
    NoColumns,

    #[error("extracted table has no {0} column")]
    MissingKeyColumn(&'static str),

    #[error("row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("{op} {path:?}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding CSV for {path:?}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("reading CSV {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Error returned by a pipeline run; one variant per stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error")]
    Config(#[from] ConfigError),

    #[error("fetch error")]
    Fetch(#[from] FetchError),

    #[error("parse error")]
    Parse(#[from] ParseError),

    #[error("data shape error")]
    DataShape(#[from] DataShapeError),

    #[error("write error")]
    Write(#[from] WriteError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) => Stage::Config,
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::Parse(_) => Stage::Parse,
            PipelineError::DataShape(_) => Stage::Normalize,
            PipelineError::Write(_) => Stage::Write,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.stage().exit_code()
    }
}
