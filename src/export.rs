use crate::error::Result;
use crate::record::{Record, value_text};
use log::info;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// First CSV column, holding each record's source line number.
pub const LINE_NUMBER_COLUMN: &str = "line_num";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jsonl,
    Csv,
}

impl ExportFormat {
    pub fn from_extension(path: &Path) -> Self {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            ExportFormat::Csv
        } else {
            ExportFormat::Jsonl
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExportFormat::Jsonl => "JSONL",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Csv => "csv",
        }
    }
}

struct CountingWriter<W> {
    inner: W,
    bytes: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Cell text for CSV and table output. Missing fields are empty.
pub fn cell_text(value: Option<&Value>) -> String {
    value.map(|v| value_text(v).into_owned()).unwrap_or_default()
}

/// Rows of `[line_number, field...]` for the first `limit` indices.
pub fn table_rows(
    records: &[Record],
    indices: &[usize],
    field_names: &[String],
    limit: usize,
) -> Vec<Vec<String>> {
    indices
        .iter()
        .filter_map(|&i| records.get(i))
        .take(limit)
        .map(|record| row_for(record, field_names))
        .collect()
}

fn row_for(record: &Record, field_names: &[String]) -> Vec<String> {
    let mut row = Vec::with_capacity(field_names.len() + 1);
    row.push(record.line_number.to_string());
    row.extend(field_names.iter().map(|name| cell_text(record.field(name))));
    row
}

/// Writes the records at `indices` to `writer`, returning the number of bytes written.
///
/// `field_names` are the CSV columns after the line number; JSONL ignores them.
pub fn export_subset<W: Write>(
    records: &[Record],
    indices: &[usize],
    field_names: &[String],
    format: ExportFormat,
    writer: W,
) -> Result<u64> {
    let mut out = CountingWriter {
        inner: writer,
        bytes: 0,
    };

    match format {
        ExportFormat::Jsonl => {
            for record in indices.iter().filter_map(|&i| records.get(i)) {
                serde_json::to_writer(&mut out, &record.value)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            Ok(out.bytes)
        }
        ExportFormat::Csv => {
            let mut csv_writer = csv::Writer::from_writer(&mut out);
            csv_writer.write_record(
                std::iter::once(LINE_NUMBER_COLUMN).chain(field_names.iter().map(String::as_str)),
            )?;
            for record in indices.iter().filter_map(|&i| records.get(i)) {
                csv_writer.write_record(row_for(record, field_names))?;
            }
            csv_writer.flush()?;
            drop(csv_writer);
            Ok(out.bytes)
        }
    }
}

pub fn export_to_path(
    path: &Path,
    records: &[Record],
    indices: &[usize],
    field_names: &[String],
    format: ExportFormat,
) -> Result<u64> {
    let file = File::create(path)?;
    let bytes = export_subset(records, indices, field_names, format, BufWriter::new(file))?;
    info!(
        "Exported {} records ({} bytes, {}) to {}",
        indices.len(),
        bytes,
        format.display_name(),
        path.display()
    );
    Ok(bytes)
}
