use std::io;
use std::path::PathBuf;

/// Errors surfaced by the viewer core.
///
/// Malformed lines are not errors at this level: they travel as
/// [`ParseError`](crate::ParseError) data inside the ingestion event stream.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("File error: {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid regex pattern: {0}")]
    InvalidQuery(#[from] regex::Error),

    #[error("Export failed: {0}")]
    Export(#[from] io::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not start loader thread: {0}")]
    Worker(#[source] io::Error),
}

impl ViewerError {
    pub fn file_access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ViewerError::FileAccess {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
