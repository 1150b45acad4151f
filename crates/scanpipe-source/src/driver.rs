//! Scheduler side of the source contract.
//!
//! These loops play the part of a pipeline executor driving a single
//! source: ask `prepare`, generate when ready, and wait on the readiness
//! handle when a background read is in flight.

use arrow::array::RecordBatch;
use scanpipe_core::Result;
use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

use crate::source::{Source, Status};

/// What a driven source produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub source: String,
    pub chunks: usize,
    pub rows: usize,
    /// Times the driver had to wait on a readiness handle.
    pub async_waits: usize,
    /// The scan stopped on a cancellation error rather than end of data.
    pub cancelled: bool,
}

impl ScanSummary {
    pub fn new(source: String) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    fn record(&mut self, batch: &RecordBatch) {
        self.chunks += 1;
        self.rows += batch.num_rows();
    }
}

enum Step {
    Continue,
    Wait,
    Done,
}

fn step<S, F>(source: &mut S, sink: &mut F, summary: &mut ScanSummary) -> Result<Step>
where
    S: Source + ?Sized,
    F: FnMut(RecordBatch),
{
    match source.prepare() {
        Status::Ready => match source.try_generate() {
            Ok(Some(batch)) => {
                summary.record(&batch);
                sink(batch);
                Ok(Step::Continue)
            }
            Ok(None) => Ok(Step::Continue),
            Err(e) if e.is_cancellation() => {
                debug!(source = %summary.source, "Scan stopped by cancellation");
                summary.cancelled = true;
                Ok(Step::Done)
            }
            Err(e) => Err(e),
        },
        Status::Async => {
            summary.async_waits += 1;
            Ok(Step::Wait)
        }
        Status::Finished => Ok(Step::Done),
    }
}

/// Run a step that may block on an inline read. On a multi-thread runtime
/// the worker hands its other tasks off first.
fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// Drive `source` to completion from an async task. Waiting for a
/// background read yields the task instead of blocking its thread.
pub async fn drive<S, F>(source: &mut S, sink: F) -> Result<ScanSummary>
where
    S: Source + ?Sized,
    F: FnMut(RecordBatch),
{
    let mut summary = ScanSummary::new(source.name());
    drive_into(source, sink, &mut summary).await?;
    Ok(summary)
}

/// Like [`drive`], but accumulates into a caller-owned summary, so the
/// counts survive if the future is dropped part way (e.g. in a `select!`).
///
/// The task yields after every step, so sibling branches get polled
/// between inline reads.
pub async fn drive_into<S, F>(source: &mut S, mut sink: F, summary: &mut ScanSummary) -> Result<()>
where
    S: Source + ?Sized,
    F: FnMut(RecordBatch),
{
    loop {
        match run_blocking(|| step(source, &mut sink, summary))? {
            Step::Continue => tokio::task::yield_now().await,
            Step::Wait => {
                let handle = source.schedule();
                handle.ready().await;
            }
            Step::Done => break,
        }
    }
    Ok(())
}

/// Drive `source` to completion on the calling thread.
pub fn drive_blocking<S, F>(source: &mut S, mut sink: F) -> Result<ScanSummary>
where
    S: Source + ?Sized,
    F: FnMut(RecordBatch),
{
    let mut summary = ScanSummary::new(source.name());
    loop {
        match step(source, &mut sink, &mut summary)? {
            Step::Continue => {}
            Step::Wait => source.schedule().wait_ready(),
            Step::Done => break,
        }
    }
    Ok(summary)
}
