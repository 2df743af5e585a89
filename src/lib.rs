//! Core of the JSONL viewer: streaming ingestion, schema detection, filtering and export.
//!
//! The GUI in `main.rs` is a thin layer over [`Session`], which owns one loaded file.

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod record;
pub mod schema;
pub mod session;

pub use config::ViewerConfig;
pub use error::{Result, ViewerError};
pub use export::{ExportFormat, export_subset, export_to_path};
pub use filter::{FilterQuery, FilterState, FilteredIndexSet, compute};
pub use ingest::{IngestEvent, IngestHandle, IngestOptions, Ingestion, StopSignal, ingest};
pub use record::{ParseError, Record};
pub use schema::{FieldSummary, SchemaAggregator, SchemaInfo, TypeTag};
pub use session::Session;
