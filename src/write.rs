// src/write.rs

use csv::{ReaderBuilder, WriterBuilder};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::Builder;
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, WriteError};
use crate::normalize::{map_columns, normalize};
use crate::table::{Column, ColumnKind, ColumnSpec, Table, Value};

/// Destination for the normalized table.
pub trait Sink {
    /// Persist `table` at `dest`, returning the number of data rows written.
    fn write(&self, table: &Table, dest: &Path) -> Result<usize, WriteError>;
}

/// Atomic CSV file sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvSink;

impl Sink for CsvSink {
    fn write(&self, table: &Table, dest: &Path) -> Result<usize, WriteError> {
        write_atomic(table, dest)
    }
}

/// Write a header row then one line per record.
pub fn write_table<W: Write>(table: &Table, out: W) -> Result<(), csv::Error> {
    let mut wtr = WriterBuilder::new().from_writer(out);
    wtr.write_record(table.columns.iter().map(|c| c.name.as_str()))?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(Value::to_string))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write `table` next to `dest` and rename it into place.
pub fn write_atomic(table: &Table, dest: &Path) -> Result<usize, WriteError> {
    write_atomic_with(table, dest, |f| f)
}

/// Like [`write_atomic`], with `wrap` applied to a handle on the temp file.
///
/// On any error the temp file is removed and `dest` is left untouched.
#[instrument(level = "info", skip_all, fields(dest = %dest.display(), rows = table.len()))]
pub fn write_atomic_with<W, F>(table: &Table, dest: &Path, wrap: F) -> Result<usize, WriteError>
where
    W: Write,
    F: FnOnce(File) -> W,
{
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let io_err = |op: &'static str, path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| WriteError::Io { op, path, source }
    };

    fs::create_dir_all(&dir).map_err(io_err("creating directory", &dir))?;

    // Same mode a plain `File::create` would get under the process umask.
    let mut builder = Builder::new();
    builder.prefix(".ukcovid-").suffix(".csv.tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let tmp = builder
        .tempfile_in(&dir)
        .map_err(io_err("creating temp file in", &dir))?;
    let tmp_path = tmp.path().to_path_buf();
    debug!(tmp = %tmp_path.display(), "writing temp file");

    // An overwrite keeps the destination's existing permissions.
    if let Ok(meta) = fs::metadata(dest) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(io_err("setting permissions on", &tmp_path))?;
    }

    let handle = tmp
        .as_file()
        .try_clone()
        .map_err(io_err("opening", &tmp_path))?;
    write_table(table, wrap(handle)).map_err(|source| WriteError::Csv {
        path: tmp_path.clone(),
        source,
    })?;

    tmp.as_file()
        .sync_all()
        .map_err(io_err("syncing", &tmp_path))?;
    tmp.persist(dest).map_err(|e| WriteError::Io {
        op: "replacing",
        path: dest.to_path_buf(),
        source: e.error,
    })?;

    info!(rows = table.len(), "wrote csv");
    Ok(table.len())
}

/// Read a CSV produced by [`write_table`] back through the normalizer.
pub fn read_table(
    path: &Path,
    columns: &[ColumnSpec],
    date_formats: &[String],
) -> Result<Table, PipelineError> {
    let csv_err = |source: csv::Error| WriteError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = ReaderBuilder::new().from_path(path).map_err(csv_err)?;

    let headers = rdr.headers().map_err(csv_err)?.clone();
    let mut table = Table::new(
        headers
            .iter()
            .map(|h| Column {
                name: h.to_string(),
                kind: ColumnKind::Text,
            })
            .collect(),
    );

    for rec in rdr.records() {
        let rec = rec.map_err(csv_err)?;
        table.rows.push(
            rec.iter()
                .map(|s| {
                    if s.is_empty() {
                        Value::Missing
                    } else {
                        Value::Text(s.to_string())
                    }
                })
                .collect(),
        );
    }

    // Header-only files are valid output; type the columns without normalizing.
    if table.is_empty() {
        let columns = map_columns(&table.columns, columns)
            .into_iter()
            .map(|(_, spec)| Column {
                name: spec.output_name().to_string(),
                kind: spec.kind,
            })
            .collect();
        return Ok(Table::new(columns));
    }
    let (table, _) = normalize(table, columns, date_formats)?;
    Ok(table)
}
