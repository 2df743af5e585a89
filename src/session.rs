//! State for one loaded file, driven from the interactive thread.

use crate::config::ViewerConfig;
use crate::error::Result;
use crate::export::{self, ExportFormat};
use crate::filter::{Debouncer, FilterQuery, FilterState};
use crate::ingest::{IngestEvent, IngestHandle};
use crate::record::{ParseError, Record};
use crate::schema::SchemaInfo;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct Session {
    config: ViewerConfig,
    path: Option<PathBuf>,
    records: Vec<Record>,
    errors: Vec<ParseError>,
    /// Set once the current run has completed.
    schema: Option<SchemaInfo>,
    progress: Option<(u64, Option<u64>)>,
    loader: Option<IngestHandle>,
    filter: FilterState,
    pending_query: Debouncer<FilterQuery>,
    notices: Vec<String>,
}

impl Session {
    pub fn new(config: ViewerConfig) -> Self {
        let debounce = config.debounce;
        Self {
            config,
            path: None,
            records: Vec::new(),
            errors: Vec::new(),
            schema: None,
            progress: None,
            loader: None,
            filter: FilterState::default(),
            pending_query: Debouncer::new(debounce),
            notices: Vec::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn set_max_lines(&mut self, max_lines: Option<u64>) {
        self.config.max_lines = max_lines.filter(|&max| max > 0);
    }

    /// Start loading `path`, replacing whatever was loaded before.
    ///
    /// A run still in progress is stopped and awaited first so two runs never feed the
    /// same state.
    pub fn load(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if let Some(mut previous) = self.loader.take() {
            previous.stop_and_wait();
        }

        self.records.clear();
        self.errors.clear();
        self.schema = None;
        self.progress = None;
        self.filter.reset(0);
        self.notices.clear();

        info!("Opening {}", path.display());
        self.loader = Some(IngestHandle::spawn(&path, self.config.ingest_options())?);
        self.path = Some(path);
        Ok(())
    }

    /// Apply every event the loader has produced so far. Never blocks.
    pub fn poll(&mut self) -> usize {
        let Some(loader) = &self.loader else {
            return 0;
        };

        let finished = loader.is_finished();
        let events: Vec<IngestEvent> = loader.drain().collect();
        let count = events.len();
        let completed = self.apply_events(events);

        if completed {
            if let Some(mut loader) = self.loader.take() {
                loader.wait();
            }
        } else if finished {
            self.loader = None;
            self.complete_abandoned_run();
        }
        count
    }

    /// Stop the current run and absorb its remaining events, including `Completed`.
    pub fn stop_loading(&mut self) {
        let Some(mut loader) = self.loader.take() else {
            return;
        };
        loader.stop_and_wait();
        let events: Vec<IngestEvent> = loader.drain().collect();
        if !self.apply_events(events) {
            self.complete_abandoned_run();
        }
    }

    /// Returns whether `Completed` was among `events`.
    fn apply_events(&mut self, events: Vec<IngestEvent>) -> bool {
        let mut completed = false;
        for event in events {
            completed |= matches!(event, IngestEvent::Completed(_));
            self.apply_event(event);
        }
        completed
    }

    /// The worker is gone but never reported `Completed`.
    fn complete_abandoned_run(&mut self) {
        warn!("Loader ended without completing");
        let error = ParseError::file_level("Loading stopped unexpectedly");
        self.notices.push(error.message.clone());
        self.errors.push(error);
        self.finish_loading(SchemaInfo::default());
    }

    fn apply_event(&mut self, event: IngestEvent) {
        match event {
            IngestEvent::Progress {
                current_line,
                total,
            } => self.progress = Some((current_line, total)),
            IngestEvent::RecordParsed(record) => self.records.push(record),
            IngestEvent::ParseFailed(error) => {
                if error.is_file_level() {
                    self.notices.push(error.message.clone());
                }
                self.errors.push(error);
            }
            IngestEvent::Completed(info) => self.finish_loading(info),
        }
    }

    fn finish_loading(&mut self, info: SchemaInfo) {
        self.schema = Some(info);
        self.progress = None;

        let query = self
            .pending_query
            .flush()
            .unwrap_or_else(|| self.filter.query().clone());
        if self.apply_query(query).is_err() {
            self.filter.reset(self.records.len());
        }
    }

    /// Queue a query edit; it is applied by [`Session::tick`] once edits settle.
    pub fn set_query(&mut self, query: FilterQuery, now: Instant) {
        self.pending_query.push(query, now);
    }

    /// Apply a queued query whose quiet period has elapsed.
    ///
    /// Returns `None` when nothing was due. Queries wait while a file is loading.
    pub fn tick(&mut self, now: Instant) -> Option<Result<usize>> {
        if self.is_loading() {
            return None;
        }
        let query = self.pending_query.take_due(now)?;
        Some(self.apply_query(query))
    }

    /// Recompute the filtered set immediately. An invalid regex keeps the previous set.
    pub fn apply_query(&mut self, query: FilterQuery) -> Result<usize> {
        let query = normalize(query);
        match self.filter.apply(&self.records, query) {
            Ok(count) => Ok(count),
            Err(e) => {
                warn!("{}", e);
                self.notices.push(e.to_string());
                Err(e)
            }
        }
    }

    pub fn clear_filters(&mut self) {
        self.pending_query.flush();
        self.filter.reset(self.records.len());
    }

    /// Write the filtered records to `path`. Without a format the extension decides.
    pub fn export(&self, path: &Path, format: Option<ExportFormat>) -> Result<u64> {
        let format = format.unwrap_or_else(|| ExportFormat::from_extension(path));
        let result = export::export_to_path(
            path,
            &self.records,
            self.filter.indices(),
            &self.field_names(),
            format,
        );
        if let Err(e) = &result {
            warn!("{}", e);
        }
        result
    }

    pub fn table_rows(&self) -> Vec<Vec<String>> {
        export::table_rows(
            &self.records,
            self.filter.indices(),
            &self.field_names(),
            self.config.table_row_limit,
        )
    }

    pub fn field_names(&self) -> Vec<String> {
        self.schema
            .as_ref()
            .map(SchemaInfo::sorted_field_names)
            .unwrap_or_default()
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_some()
    }

    pub fn has_pending_query(&self) -> bool {
        self.pending_query.is_pending()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn schema(&self) -> Option<&SchemaInfo> {
        self.schema.as_ref()
    }

    pub fn progress(&self) -> Option<(u64, Option<u64>)> {
        self.progress
    }

    pub fn query(&self) -> &FilterQuery {
        self.filter.query()
    }

    pub fn filtered(&self) -> &[usize] {
        self.filter.indices()
    }

    pub fn filtered_record(&self, position: usize) -> Option<&Record> {
        self.filter
            .indices()
            .get(position)
            .and_then(|&index| self.records.get(index))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ViewerConfig::default())
    }
}

fn normalize(mut query: FilterQuery) -> FilterQuery {
    let trimmed = query.text.trim();
    if trimmed.len() != query.text.len() {
        query.text = trimmed.to_string();
    }
    query.field_scope = query.field_scope.filter(|field| !field.is_empty());
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;
    use std::time::Duration;

    const EXAMPLE: &str = "{\"a\":1}\n{\"b\":\"x\"}\nnot json\n{\"a\":2,\"b\":\"y\"}\n";

    fn wait_loaded(session: &mut Session) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while session.is_loading() {
            session.poll();
            assert!(Instant::now() < deadline, "load did not finish");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn loaded(contents: &str) -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        std::fs::write(&path, contents).unwrap();
        let mut session = Session::default();
        session.load(&path).unwrap();
        wait_loaded(&mut session);
        (dir, session)
    }

    #[test]
    fn load_collects_records_errors_and_schema() {
        let (_dir, session) = loaded(EXAMPLE);
        let schema = session.schema().unwrap();

        assert_eq!(session.records().len(), 3);
        assert_eq!(session.errors().len(), 1);
        assert_eq!(schema.total_lines, 4);
        assert_eq!(session.filtered(), &[0, 1, 2]);
        assert_eq!(session.field_names(), vec!["a", "b"]);
    }

    #[test]
    fn debounced_query_applies_after_quiet_period() {
        let (_dir, mut session) = loaded(EXAMPLE);
        let start = Instant::now();

        session.set_query(FilterQuery::text("y"), start);
        session.set_query(FilterQuery::text("x").in_field("b"), start);
        assert!(session.tick(start).is_none());

        let applied = session.tick(start + Duration::from_millis(300)).unwrap();
        assert_eq!(applied.unwrap(), 1);
        assert_eq!(session.filtered(), &[1]);
        assert_eq!(session.filtered_record(0).unwrap().line_number, 2);
    }

    #[test]
    fn invalid_regex_keeps_filtered_set_and_leaves_notice() {
        let (_dir, mut session) = loaded(EXAMPLE);
        session.apply_query(FilterQuery::text("  a  ")).unwrap();
        assert_eq!(session.filtered(), &[0, 2]);
        assert_eq!(session.query().text, "a");

        let err = session.apply_query(FilterQuery::regex("(")).unwrap_err();
        assert!(matches!(err, ViewerError::InvalidQuery(_)));
        assert_eq!(session.filtered(), &[0, 2]);
        assert_eq!(session.take_notices().len(), 1);

        session.clear_filters();
        assert_eq!(session.filtered(), &[0, 1, 2]);
    }

    #[test]
    fn reload_replaces_previous_state() {
        let (dir, mut session) = loaded(EXAMPLE);
        let other = dir.path().join("other.jsonl");
        std::fs::write(&other, "{\"z\":true}\n").unwrap();

        session.load(&other).unwrap();
        wait_loaded(&mut session);

        assert_eq!(session.records().len(), 1);
        assert!(session.errors().is_empty());
        assert_eq!(session.field_names(), vec!["z"]);
        assert_eq!(session.path(), Some(other.as_path()));
    }

    #[test]
    fn missing_file_surfaces_notice_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::default();
        session.load(dir.path().join("absent.jsonl")).unwrap();
        wait_loaded(&mut session);

        assert_eq!(session.errors().len(), 1);
        assert!(session.errors()[0].is_file_level());
        assert_eq!(session.schema(), Some(&SchemaInfo::default()));
        assert_eq!(session.take_notices().len(), 1);
    }

    #[test]
    fn stop_loading_keeps_counts_consistent() {
        let mut body = String::new();
        for i in 0..50_000 {
            body.push_str(&format!("{{\"i\":{}}}\n", i));
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.jsonl");
        std::fs::write(&path, body).unwrap();

        let mut session = Session::default();
        session.set_max_lines(None);
        session.load(&path).unwrap();
        session.stop_loading();

        assert!(!session.is_loading());
        let schema = session.schema().unwrap();
        assert_eq!(schema.valid_lines, session.records().len() as u64);
        assert_eq!(session.filtered().len(), session.records().len());
    }

    #[test]
    fn stop_loading_completes_a_run_that_never_finished() {
        let mut session = Session::default();
        session.loader = Some(
            IngestHandle::replay(vec![IngestEvent::RecordParsed(Record::new(
                1,
                serde_json::json!({"a": 1}),
                "{\"a\":1}",
            ))])
            .unwrap(),
        );

        session.stop_loading();

        assert!(!session.is_loading());
        assert_eq!(session.records().len(), 1);
        assert_eq!(session.schema(), Some(&SchemaInfo::default()));
        assert_eq!(session.errors().len(), 1);
        assert!(session.errors()[0].is_file_level());
        assert_eq!(session.filtered(), &[0]);
        assert_eq!(session.take_notices(), vec!["Loading stopped unexpectedly"]);
    }

    #[test]
    fn poll_completes_a_run_that_never_finished() {
        let mut session = Session::default();
        session.loader = Some(IngestHandle::replay(Vec::new()).unwrap());

        wait_loaded(&mut session);

        assert_eq!(session.schema(), Some(&SchemaInfo::default()));
        assert!(session.errors()[0].is_file_level());
    }

    #[test]
    fn invalid_query_queued_during_load_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        std::fs::write(&path, EXAMPLE).unwrap();

        let mut session = Session::default();
        session.load(&path).unwrap();
        session.set_query(FilterQuery::regex("("), Instant::now());
        wait_loaded(&mut session);

        assert_eq!(session.query(), &FilterQuery::default());
        assert_eq!(session.filtered(), &[0, 1, 2]);
        assert!(!session.has_pending_query());
        assert_eq!(session.take_notices().len(), 1);
    }

    #[test]
    fn export_writes_filtered_subset() {
        let (dir, mut session) = loaded(EXAMPLE);
        session.apply_query(FilterQuery::text("").in_field("b")).unwrap();

        let out = dir.path().join("subset.csv");
        let bytes = session.export(&out, None).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();

        assert_eq!(bytes as usize, text.len());
        assert_eq!(text, "line_num,a,b\n2,,x\n4,2,y\n");
    }

    #[test]
    fn max_lines_from_config_is_honoured() {
        let (_dir, session) = loaded(&"{\"n\":1}\n".repeat(10_005));
        assert_eq!(session.records().len(), 10_000);
        assert_eq!(session.schema().unwrap().total_lines, 10_000);
    }
}
