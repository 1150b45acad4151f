//! Pull-based scan source.
//!
//! `ScanSource` adapts a blocking [`ReadAlgorithm`] to the pull protocol a
//! pipeline scheduler speaks (`prepare` / `try_generate` / `schedule` /
//! `cancel`). With background reads enabled each `read()` runs on a worker
//! from a [`TaskRunner`] and the scheduler learns about completion through a
//! [`ReadinessHandle`], so the pipeline thread never blocks on storage.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use scanpipe_core::{ChunkAndProgress, ReadAlgorithm, Result, ScanError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::async_state::{AsyncReadingState, Stage};
use crate::metrics::ScanMetrics;
use crate::readiness::{Event, ReadinessHandle, ReadinessSignal};
use crate::runner::{io_runner, TaskRunner};

/// What the scheduler should do next with a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Call `try_generate`.
    Ready,
    /// A background read is in flight: call `schedule` and poll the handle.
    Async,
    /// No more data will be produced.
    Finished,
}

/// The contract between a pipeline scheduler and a data source.
///
/// The scheduler never calls into one source from two threads at once.
pub trait Source: Send {
    fn name(&self) -> String;

    fn header(&self) -> SchemaRef;

    fn prepare(&mut self) -> Status;

    /// Advance the source. `Ok(None)` means "no chunk this time" and is not
    /// terminal; `prepare` reports when the source is done.
    fn try_generate(&mut self) -> Result<Option<RecordBatch>>;

    /// Handle to poll after `prepare` returned [`Status::Async`].
    fn schedule(&mut self) -> ReadinessHandle;

    fn cancel(&self);
}

/// Rows and bytes read so far, including reads that produced no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub read_rows: u64,
    pub read_bytes: u64,
}

// ---------------------------------------------------------------------------
// ScanSource
// ---------------------------------------------------------------------------

pub struct ScanSource {
    algorithm: Arc<dyn ReadAlgorithm>,
    header: SchemaRef,
    async_state: Option<AsyncReadingState>,
    cancelled: AtomicBool,
    /// End of data seen, a read failed, or the output was closed.
    finished: bool,
    progress: Progress,
    metrics: Option<ScanMetrics>,
}

impl ScanSource {
    /// Build a source using the algorithm's own settings. Background reads go
    /// to the shared I/O runtime.
    pub fn new(algorithm: Arc<dyn ReadAlgorithm>) -> Result<Self> {
        let settings = algorithm.settings().clone();
        if settings.async_reads_enabled() {
            let runner = io_runner(settings.io_threads)?;
            Ok(Self::with_runner(algorithm, runner, Arc::new(Event::new())))
        } else {
            if settings.use_asynchronous_read_from_pool {
                warn!(
                    "Background reads requested for {} but not supported here; reading inline",
                    algorithm.name()
                );
            }
            Ok(Self::build(algorithm, None))
        }
    }

    /// Build a source that offloads reads to `runner` and signals through
    /// `signal`, provided the algorithm's settings allow background reads.
    pub fn with_runner(
        algorithm: Arc<dyn ReadAlgorithm>,
        runner: Arc<dyn TaskRunner>,
        signal: Arc<dyn ReadinessSignal>,
    ) -> Self {
        let async_state = algorithm
            .settings()
            .async_reads_enabled()
            .then(|| AsyncReadingState::new(runner, signal));
        Self::build(algorithm, async_state)
    }

    /// Build a source that always reads inline.
    pub fn sync(algorithm: Arc<dyn ReadAlgorithm>) -> Self {
        Self::build(algorithm, None)
    }

    fn build(algorithm: Arc<dyn ReadAlgorithm>, async_state: Option<AsyncReadingState>) -> Self {
        let header = algorithm.header();
        info!(
            source = %algorithm.name(),
            background_reads = async_state.is_some(),
            "Created scan source"
        );
        Self {
            algorithm,
            header,
            async_state,
            cancelled: AtomicBool::new(false),
            finished: false,
            progress: Progress::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ScanMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_async(&self) -> bool {
        self.async_state.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Current stage of the background cycle, if background reads are on.
    pub fn stage(&self) -> Option<Stage> {
        self.async_state.as_ref().map(AsyncReadingState::stage)
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Account for a read and decide whether it yields a chunk.
    fn report_progress(&mut self, chunk: ChunkAndProgress) -> Option<RecordBatch> {
        if chunk.has_progress() {
            self.progress.read_rows += chunk.num_read_rows;
            self.progress.read_bytes += chunk.num_read_bytes;
            if let Some(metrics) = &self.metrics {
                metrics.read_rows.inc_by(chunk.num_read_rows);
                metrics.read_bytes.inc_by(chunk.num_read_bytes);
            }
        }

        if chunk.is_finished {
            debug!(source = %self.algorithm.name(), "Read algorithm reported end of data");
            self.finished = true;
        }

        if !chunk.has_rows() {
            return None;
        }
        if let Some(metrics) = &self.metrics {
            metrics.chunks_emitted.inc();
        }
        chunk.chunk
    }

    /// Any error ends data production; no further cycles are started.
    fn on_read_result(&mut self, result: Result<ChunkAndProgress>) -> Result<Option<RecordBatch>> {
        match result {
            Ok(chunk) => Ok(self.report_progress(chunk)),
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Drop a finished cycle nobody will consume after cancellation.
    fn discard_finished_cycle(&self) {
        let Some(state) = &self.async_state else {
            return;
        };
        if state.stage() != Stage::IsFinished {
            return;
        }
        match state.get_result() {
            Ok(chunk) => debug!(
                rows = chunk.num_rows(),
                "Discarding background read result after cancellation"
            ),
            Err(e) => debug!("Discarding background read error after cancellation: {}", e),
        }
    }

    fn start_background_read(&self, state: &AsyncReadingState) {
        let handle = state.start();
        let algorithm = Arc::clone(&self.algorithm);
        if let Some(metrics) = &self.metrics {
            metrics.background_cycles.inc();
        }

        // The job owns its CycleHandle, which keeps the control block alive
        // until the result is published even if this source is gone.
        state.schedule(Box::new(move || {
            match catch_unwind(AssertUnwindSafe(|| algorithm.read())) {
                Ok(Ok(chunk)) => handle.set_result(chunk),
                Ok(Err(e)) => {
                    if !e.is_cancellation() {
                        warn!("Background read of {} failed: {}", algorithm.name(), e);
                    }
                    handle.set_error(e);
                }
                Err(payload) => handle.set_error(ScanError::from_panic(payload)),
            }
        }));
    }
}

impl Source for ScanSource {
    fn name(&self) -> String {
        self.algorithm.name()
    }

    fn header(&self) -> SchemaRef {
        Arc::clone(&self.header)
    }

    fn prepare(&mut self) -> Status {
        // Checked before Async so a cancelled query cannot loop on Async forever.
        if self.is_cancelled() {
            if self.stage() == Some(Stage::InProgress) {
                return Status::Async;
            }
            self.discard_finished_cycle();
            self.finished = true;
            return Status::Finished;
        }

        if self.stage() == Some(Stage::InProgress) {
            return Status::Async;
        }

        if self.finished {
            Status::Finished
        } else {
            Status::Ready
        }
    }

    /// A panic in a background read comes back as [`ScanError::Panicked`];
    /// an inline read runs on the caller's thread and its panic propagates.
    fn try_generate(&mut self) -> Result<Option<RecordBatch>> {
        let result = match &self.async_state {
            None => self.algorithm.read(),
            Some(state) => match state.stage() {
                Stage::IsFinished => state.get_result(),
                Stage::NotStarted => {
                    self.start_background_read(state);
                    return Ok(None);
                }
                Stage::InProgress => {
                    panic!("try_generate called while a background read is in progress")
                }
            },
        };
        self.on_read_result(result)
    }

    fn schedule(&mut self) -> ReadinessHandle {
        let Some(state) = &self.async_state else {
            panic!("schedule called on a source without background reads");
        };
        // The cycle may already have finished since `prepare` saw it running.
        assert_ne!(
            state.stage(),
            Stage::NotStarted,
            "schedule called without a background read in flight"
        );
        state.readiness()
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            debug!(source = %self.algorithm.name(), "Cancelling scan source");
            self.algorithm.cancel();
        }
    }
}

impl std::fmt::Debug for ScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSource")
            .field("name", &self.algorithm.name())
            .field("async_state", &self.async_state)
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.finished)
            .field("progress", &self.progress)
            .finish()
    }
}
