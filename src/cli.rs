use crate::config::{DEFAULT_MAX_LINES, DEFAULT_TABLE_ROW_LIMIT, ViewerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "jsonl-lens", version, about = "Streaming JSONL viewer")]
pub struct Args {
    /// JSONL file to open on startup (`.gz` is decompressed on the fly)
    pub file: Option<PathBuf>,

    /// Stop loading after this many lines (0 = all)
    #[arg(long, default_value_t = DEFAULT_MAX_LINES)]
    pub max_lines: u64,

    /// Delay before a search edit is applied, in milliseconds
    #[arg(long, default_value_t = 300)]
    pub debounce_ms: u64,

    /// Rows shown in the table view
    #[arg(long, default_value_t = DEFAULT_TABLE_ROW_LIMIT)]
    pub table_rows: usize,
}

impl Args {
    pub fn config(&self) -> ViewerConfig {
        ViewerConfig {
            max_lines: (self.max_lines > 0).then_some(self.max_lines),
            debounce: Duration::from_millis(self.debounce_ms),
            table_row_limit: self.table_rows,
            ..ViewerConfig::default()
        }
    }

    /// The startup file, if one was given and exists.
    pub fn startup_file(&self) -> Option<&PathBuf> {
        self.file.as_ref().filter(|path| path.exists())
    }
}
