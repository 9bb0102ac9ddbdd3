//! Per-article result capture as JSON lines.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;

use chrono::Utc;
use uuid::Uuid;

use super::ClassificationResult;

/// One line of the results file.
#[derive(Debug, Clone, Serialize)]
pub struct ResultTrace {
    pub timestamp_ms: i64,
    pub run_id: Option<Uuid>,
    /// Benchmark flow: "baseline", "batch", "router" or "hybrid".
    pub run: &'static str,
    pub index: usize,
    #[serde(flatten)]
    pub result: ClassificationResult,
}

impl ResultTrace {
    pub fn new(
        run: &'static str,
        run_id: Option<Uuid>,
        index: usize,
        result: ClassificationResult,
    ) -> Self {
        Self {
            timestamp_ms: Utc::now().timestamp_millis(),
            run_id,
            run,
            index,
            result,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
}

pub trait ResultSink: Send + Sync {
    fn record(&self, event: ResultTrace) -> Result<(), TraceError>;
}

/// Streams results to a file from a background writer thread.
#[derive(Clone)]
pub struct JsonlResultSink {
    sender: mpsc::Sender<ResultTrace>,
}

/// Handle on the writer thread; join after the last sink clone is dropped.
pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<(), TraceError>>>,
}

impl TraceWorker {
    pub fn join(mut self) -> Result<(), TraceError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TraceError::Join("trace worker panicked".to_string())),
            },
            None => Ok(()),
        }
    }
}

impl JsonlResultSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<ResultTrace>();
        let handle = std::thread::spawn(move || write_results(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl ResultSink for JsonlResultSink {
    fn record(&self, event: ResultTrace) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_results(
    file: std::fs::File,
    receiver: mpsc::Receiver<ResultTrace>,
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(file);
    for event in receiver {
        let line = serde_json::to_string(&event).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Send every result of a run to `sink`, tagged with its position.
pub fn record_all<'a, S, I>(
    sink: &S,
    run: &'static str,
    run_id: Option<Uuid>,
    results: I,
) -> Result<(), TraceError>
where
    S: ResultSink + ?Sized,
    I: IntoIterator<Item = &'a ClassificationResult>,
{
    for (index, result) in results.into_iter().enumerate() {
        sink.record(ResultTrace::new(run, run_id, index, result.clone()))?;
    }
    Ok(())
}
