//! Streaming JSONL ingestion.
//!
//! [`ingest`] returns a lazy, finite event sequence for one file. [`IngestHandle`] runs the
//! same sequence on a background thread and hands events over an unbounded channel, so a
//! slow consumer never stalls the reader.

use crate::error::{Result, ViewerError};
use crate::record::{ParseError, Record};
use crate::schema::{SchemaAggregator, SchemaInfo};
use flate2::read::MultiGzDecoder;
use log::{debug, info, warn};
use memmap2::Mmap;
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    /// `total` is an estimate of the line count, unknown for compressed input.
    Progress { current_line: u64, total: Option<u64> },
    RecordParsed(Record),
    ParseFailed(ParseError),
    /// Always the last event of a run.
    Completed(SchemaInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Stop once the line ordinal exceeds this. `None` or `Some(0)` reads everything.
    pub max_lines: Option<u64>,
    pub progress_interval: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_lines: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl IngestOptions {
    fn line_limit(&self) -> Option<u64> {
        self.max_lines.filter(|&max| max > 0)
    }
}

/// Cooperative cancellation flag shared between a run and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

struct Source {
    reader: Box<dyn BufRead + Send>,
    estimated_total: Option<u64>,
}

fn open_source(path: &Path) -> Result<Source> {
    let file = File::open(path).map_err(|e| ViewerError::file_access(path, e))?;
    let file_size = file
        .metadata()
        .map_err(|e| ViewerError::file_access(path, e))?
        .len();

    if file_size == 0 {
        return Ok(Source {
            reader: Box::new(io::empty()),
            estimated_total: if is_gzip_path(path) { None } else { Some(0) },
        });
    }

    // Memory map the file for efficient access
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| ViewerError::file_access(path, e))?;

    if is_gzip_path(path) {
        Ok(Source {
            reader: Box::new(BufReader::new(MultiGzDecoder::new(Cursor::new(mmap)))),
            estimated_total: None,
        })
    } else {
        let estimated_total = count_lines(&mmap);
        Ok(Source {
            reader: Box::new(Cursor::new(mmap)),
            estimated_total: Some(estimated_total),
        })
    }
}

/// Number of lines in `data`, counting a final line without a trailing newline.
pub fn count_lines(data: &[u8]) -> u64 {
    let newlines = memchr::memchr_iter(b'\n', data).count() as u64;
    match data.last() {
        Some(&b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

enum Phase {
    Unopened,
    Reading(Box<dyn BufRead + Send>),
    Done,
}

/// Lazy event sequence for one ingestion run. Not restartable.
pub struct Ingestion {
    path: PathBuf,
    options: IngestOptions,
    stop: StopSignal,
    phase: Phase,
    aggregator: SchemaAggregator,
    pending: VecDeque<IngestEvent>,
    buf: Vec<u8>,
    line_number: u64,
    processed: u64,
    estimated_total: Option<u64>,
}

pub fn ingest(path: impl Into<PathBuf>, options: IngestOptions, stop: StopSignal) -> Ingestion {
    Ingestion {
        path: path.into(),
        options,
        stop,
        phase: Phase::Unopened,
        aggregator: SchemaAggregator::new(),
        pending: VecDeque::new(),
        buf: Vec::with_capacity(4096),
        line_number: 0,
        processed: 0,
        estimated_total: None,
    }
}

impl Ingestion {
    /// Statistics gathered so far.
    pub fn schema(&self) -> &SchemaInfo {
        self.aggregator.info()
    }

    fn open(&mut self) {
        info!("Loading {}", self.path.display());
        match open_source(&self.path) {
            Ok(source) => {
                self.estimated_total = match (source.estimated_total, self.options.line_limit()) {
                    (Some(total), Some(max)) => Some(total.min(max)),
                    (total, _) => total,
                };
                self.phase = Phase::Reading(source.reader);
            }
            Err(e) => {
                warn!("{}", e);
                self.pending
                    .push_back(IngestEvent::ParseFailed(ParseError::file_level(e.to_string())));
                self.finish();
            }
        }
    }

    fn step(&mut self) {
        if self.stop.is_stopped() {
            debug!("Stop requested at line {}", self.line_number);
            self.finish();
            return;
        }

        let Phase::Reading(reader) = &mut self.phase else {
            return;
        };

        self.buf.clear();
        match reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => self.finish(),
            Ok(_) => {
                self.line_number += 1;
                if let Some(max) = self.options.line_limit() {
                    if self.line_number > max {
                        self.finish();
                        return;
                    }
                }
                self.process_line();
            }
            Err(e) => {
                let err = ViewerError::file_access(&self.path, e);
                warn!("{}", err);
                self.pending
                    .push_back(IngestEvent::ParseFailed(ParseError::file_level(err.to_string())));
                self.finish();
            }
        }
    }

    fn process_line(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.trim();
        if line.is_empty() {
            return;
        }

        let line_number = self.line_number;
        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                self.aggregator.record_valid(line_number);
                if let Value::Object(map) = &value {
                    self.aggregator.observe(map);
                }
                self.pending
                    .push_back(IngestEvent::RecordParsed(Record::new(line_number, value, line)));
            }
            Err(e) => {
                self.aggregator.record_error(line_number);
                self.pending.push_back(IngestEvent::ParseFailed(ParseError::new(
                    line_number,
                    line,
                    e.to_string(),
                )));
            }
        }

        self.processed += 1;
        let interval = self.options.progress_interval;
        if interval > 0 && self.processed % interval == 0 {
            debug!("Loaded {} lines", line_number);
            self.pending.push_back(IngestEvent::Progress {
                current_line: line_number,
                total: self.estimated_total,
            });
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        let info = std::mem::take(&mut self.aggregator).finish();
        info!(
            "Finished {}: {} lines, {} valid, {} errors",
            self.path.display(),
            info.total_lines,
            info.valid_lines,
            info.error_lines
        );
        self.pending.push_back(IngestEvent::Completed(info));
    }
}

impl Iterator for Ingestion {
    type Item = IngestEvent;

    fn next(&mut self) -> Option<IngestEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.phase {
                Phase::Done => return None,
                Phase::Unopened => self.open(),
                Phase::Reading(_) => self.step(),
            }
        }
    }
}

/// An ingestion run executing on its own thread.
pub struct IngestHandle {
    receiver: mpsc::Receiver<IngestEvent>,
    stop: StopSignal,
    worker: Option<thread::JoinHandle<()>>,
}

impl IngestHandle {
    pub fn spawn(path: impl Into<PathBuf>, options: IngestOptions) -> Result<Self> {
        let path = path.into();
        Self::run(move |stop| ingest(path, options, stop))
    }

    /// Replays `events` from a worker thread, then exits. Nothing forces a `Completed`.
    #[cfg(test)]
    pub(crate) fn replay(events: Vec<IngestEvent>) -> Result<Self> {
        Self::run(move |_| events)
    }

    fn run<F, I>(events: F) -> Result<Self>
    where
        F: FnOnce(StopSignal) -> I + Send + 'static,
        I: IntoIterator<Item = IngestEvent>,
    {
        let stop = StopSignal::new();
        let worker_stop = stop.clone();
        let (sender, receiver) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("jsonl-loader".to_string())
            .spawn(move || {
                for event in events(worker_stop) {
                    if sender.send(event).is_err() {
                        break;
                    }
                }
            })
            .map_err(ViewerError::Worker)?;

        Ok(Self {
            receiver,
            stop,
            worker: Some(worker),
        })
    }

    /// Next buffered event, without blocking.
    pub fn try_recv(&self) -> Option<IngestEvent> {
        self.receiver.try_recv().ok()
    }

    /// Next event, blocking until one arrives or the run has ended.
    pub fn recv(&self) -> Option<IngestEvent> {
        self.receiver.recv().ok()
    }

    pub fn drain(&self) -> impl Iterator<Item = IngestEvent> + '_ {
        self.receiver.try_iter()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(|w| w.is_finished())
    }

    /// Block until the worker thread exits. Buffered events stay readable.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Loader thread panicked");
            }
        }
    }

    pub fn stop_and_wait(&mut self) {
        self.stop();
        self.wait();
    }
}

impl Drop for IngestHandle {
    fn drop(&mut self) {
        self.stop_and_wait();
    }
}
