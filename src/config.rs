use crate::ingest::{DEFAULT_PROGRESS_INTERVAL, IngestOptions};
use std::time::Duration;

pub const DEFAULT_MAX_LINES: u64 = 10_000;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_TABLE_ROW_LIMIT: usize = 1000;
pub const DEFAULT_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// `None` loads the whole file.
    pub max_lines: Option<u64>,
    /// Quiet period before a query edit is applied.
    pub debounce: Duration,
    pub progress_interval: u64,
    pub table_row_limit: usize,
    pub preview_chars: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            max_lines: Some(DEFAULT_MAX_LINES),
            debounce: DEFAULT_DEBOUNCE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            table_row_limit: DEFAULT_TABLE_ROW_LIMIT,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl ViewerConfig {
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            max_lines: self.max_lines,
            progress_interval: self.progress_interval,
        }
    }
}
