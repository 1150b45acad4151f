//! Shared read-algorithm doubles for scan source tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow::array::{Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use scanpipe_core::{ChunkAndProgress, ReadAlgorithm, ReadSettings, Result, ScanError};
use scanpipe_source::{Job, TaskRunner};

pub fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]))
}

pub fn batch(rows: usize) -> RecordBatch {
    RecordBatch::try_new(
        schema(),
        vec![Arc::new(Int64Array::from_iter_values(0..rows as i64))],
    )
    .unwrap()
}

/// One scripted outcome of `read()`.
#[derive(Debug)]
pub enum Step {
    Chunk {
        rows: usize,
        read_rows: u64,
        read_bytes: u64,
        finished: bool,
    },
    Fail(&'static str),
    Panic(&'static str),
}

impl Step {
    /// `rows` rows, progress equal to the rows, 8 bytes per row.
    pub fn rows(rows: usize) -> Self {
        Step::Chunk {
            rows,
            read_rows: rows as u64,
            read_bytes: rows as u64 * 8,
            finished: false,
        }
    }

    pub fn empty() -> Self {
        Step::Chunk {
            rows: 0,
            read_rows: 0,
            read_bytes: 0,
            finished: false,
        }
    }

    pub fn end() -> Self {
        Step::Chunk {
            rows: 0,
            read_rows: 0,
            read_bytes: 0,
            finished: true,
        }
    }
}

/// Read algorithm that replays a fixed script.
pub struct ScriptedReader {
    steps: Mutex<VecDeque<Step>>,
    settings: ReadSettings,
    latency: Option<Duration>,
    pub calls: AtomicUsize,
    pub completed: AtomicUsize,
    pub cancelled: AtomicBool,
    pub threads: Mutex<Vec<Option<String>>>,
}

impl ScriptedReader {
    pub fn new(steps: Vec<Step>, background: bool) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            settings: ReadSettings::default().with_async_read(background),
            latency: None,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_settings(mut self, settings: ReadSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl ReadAlgorithm for ScriptedReader {
    fn read(&self) -> Result<ChunkAndProgress> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.threads
            .lock()
            .unwrap()
            .push(std::thread::current().name().map(str::to_string));
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        let step = self.steps.lock().unwrap().pop_front();
        let result = match step {
            Some(Step::Chunk {
                rows,
                read_rows,
                read_bytes,
                finished,
            }) => {
                let chunk = if rows > 0 { Some(batch(rows)) } else { None };
                Ok(ChunkAndProgress {
                    chunk,
                    num_read_rows: read_rows,
                    num_read_bytes: read_bytes,
                    is_finished: finished,
                })
            }
            Some(Step::Fail(msg)) => Err(ScanError::Read(anyhow::anyhow!(msg))),
            Some(Step::Panic(msg)) => panic!("{}", msg),
            None => Ok(ChunkAndProgress::finished()),
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> String {
        "ScriptedReader".to_string()
    }

    fn header(&self) -> SchemaRef {
        schema()
    }

    fn settings(&self) -> &ReadSettings {
        &self.settings
    }
}

/// Runner that drops every job without running it.
#[derive(Debug, Default)]
pub struct DiscardingRunner {
    pub dropped: AtomicUsize,
}

impl TaskRunner for DiscardingRunner {
    fn submit(&self, job: Job) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
        drop(job);
    }
}

/// Runner that queues jobs until the test runs them.
#[derive(Default)]
pub struct ManualRunner {
    jobs: Mutex<Vec<Job>>,
}

impl ManualRunner {
    pub fn run_all(&self) -> usize {
        let jobs: Vec<Job> = std::mem::take(&mut *self.jobs.lock().unwrap());
        let n = jobs.len();
        for job in jobs {
            job();
        }
        n
    }
}

impl std::fmt::Debug for ManualRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualRunner")
            .field("queued", &self.jobs.lock().unwrap().len())
            .finish()
    }
}

impl TaskRunner for ManualRunner {
    fn submit(&self, job: Job) {
        self.jobs.lock().unwrap().push(job);
    }
}
