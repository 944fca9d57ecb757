// src/pipeline.rs

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{info, info_span};

use crate::config::Config;
use crate::error::{PipelineError, WriteError};
use crate::fetch::{Fetch, FetchRequest, HttpFetcher};
use crate::normalize::{normalize, NormalizeStats};
use crate::parse::parse_response;
use crate::table::Table;
use crate::write::{write_table, CsvSink, Sink};

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub rows_written: usize,
    /// `None` for a dry run.
    pub output_path: Option<PathBuf>,
    pub stats: NormalizeStats,
}

/// fetch → parse → normalize → write, once.
pub struct Pipeline {
    config: Config,
    fetcher: Box<dyn Fetch>,
    sink: Box<dyn Sink>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: Box::new(HttpFetcher),
            sink: Box::new(CsvSink),
        }
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetch + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn with_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch, parse and normalize; everything but the write.
    pub fn collect(&self) -> Result<(Table, NormalizeStats), PipelineError> {
        let cfg = &self.config;

        let resp = {
            let _span = info_span!("fetch").entered();
            self.fetcher.fetch(&FetchRequest::from_config(cfg))?
        };

        let raw = {
            let _span = info_span!("parse").entered();
            parse_response(&resp, cfg)?
        };
        drop(resp);

        let _span = info_span!("normalize").entered();
        Ok(normalize(raw, &cfg.columns, &cfg.date_formats)?)
    }

    /// Run every stage and write to the configured output path.
    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        let start = Instant::now();
        let (table, stats) = self.collect()?;

        let dest: &Path = &self.config.output_path;
        let rows_written = {
            let _span = info_span!("write").entered();
            self.sink.write(&table, dest)?
        };

        info!(
            rows = rows_written,
            path = %dest.display(),
            elapsed = ?start.elapsed(),
            "run complete"
        );
        Ok(RunSummary {
            rows_written,
            output_path: Some(dest.to_path_buf()),
            stats,
        })
    }

    /// Run every stage but print the CSV to `out` instead of the output path.
    pub fn dry_run<W: Write>(&self, out: W) -> Result<RunSummary, PipelineError> {
        let (table, stats) = self.collect()?;
        write_table(&table, out).map_err(|source| WriteError::Csv {
            path: PathBuf::from("<stdout>"),
            source,
        })?;
        info!(rows = table.len(), "dry run complete");
        Ok(RunSummary {
            rows_written: table.len(),
            output_path: None,
            stats,
        })
    }
}
