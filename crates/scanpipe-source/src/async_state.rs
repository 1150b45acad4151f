//! Cross-thread state for offloading reads to a background worker.
//!
//! One [`Control`] block lives for the whole life of a source and is reused
//! by every read cycle:
//!
//! ```text
//! NotStarted -> InProgress -> IsFinished -> NotStarted ...
//! ```
//!
//! The pipeline thread moves `NotStarted -> InProgress` ([`AsyncReadingState::start`])
//! and `IsFinished -> NotStarted` ([`AsyncReadingState::get_result`]). The
//! background job owns the [`CycleHandle`] returned by `start` and is the
//! only party that can move `InProgress -> IsFinished`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use scanpipe_core::{ChunkAndProgress, Result, ScanError};
use tracing::debug;

use crate::readiness::{ReadinessHandle, ReadinessSignal};
use crate::runner::{Job, TaskRunner};

/// Position of the control block in its read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    NotStarted = 0,
    InProgress = 1,
    IsFinished = 2,
}

impl Stage {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Stage::NotStarted,
            1 => Stage::InProgress,
            2 => Stage::IsFinished,
            other => unreachable!("invalid stage value {}", other),
        }
    }
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// The block shared between the pipeline thread and an in-flight job.
///
/// Invariants:
///   * only the job holding the cycle's [`CycleHandle`] writes `outcome`
///     and moves `InProgress -> IsFinished`;
///   * `outcome` is written before the stage becomes `IsFinished`, and the
///     stage becomes `IsFinished` before the signal fires.
pub struct Control {
    stage: AtomicU8,
    signal: Arc<dyn ReadinessSignal>,
    // Never contended: the stage machine keeps writer and reader apart.
    outcome: Mutex<Option<Result<ChunkAndProgress>>>,
}

impl Control {
    fn new(signal: Arc<dyn ReadinessSignal>) -> Self {
        Self {
            stage: AtomicU8::new(Stage::NotStarted as u8),
            signal,
            outcome: Mutex::new(None),
        }
    }

    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Acquire))
    }

    fn transition(&self, from: Stage, to: Stage) {
        if let Err(actual) =
            self.stage
                .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!(
                "invalid stage transition {:?} -> {:?}: stage is {:?}",
                from,
                to,
                Stage::from_u8(actual)
            );
        }
    }

    fn finish(&self, outcome: Result<ChunkAndProgress>) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        self.transition(Stage::InProgress, Stage::IsFinished);
        self.signal.signal();
    }

    fn take_result(&self) -> Result<ChunkAndProgress> {
        let stage = self.stage();
        assert_eq!(
            stage,
            Stage::IsFinished,
            "get_result called while stage is {:?}",
            stage
        );
        self.signal.wait();
        let outcome = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.transition(Stage::IsFinished, Stage::NotStarted);
        match outcome {
            Some(outcome) => outcome,
            None => unreachable!("finished cycle without an outcome"),
        }
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("stage", &self.stage())
            .field("signal", &self.signal)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CycleHandle
// ---------------------------------------------------------------------------

/// The background job's strong reference to the control block.
///
/// Finishing consumes the handle, so a cycle is finished at most once. A
/// handle dropped without finishing (the runner discarded the job) finishes
/// the cycle with [`ScanError::TaskDropped`].
pub struct CycleHandle {
    control: Option<Arc<Control>>,
}

impl CycleHandle {
    pub fn set_result(mut self, chunk: ChunkAndProgress) {
        if let Some(control) = self.control.take() {
            control.finish(Ok(chunk));
        }
    }

    pub fn set_error(mut self, error: ScanError) {
        if let Some(control) = self.control.take() {
            control.finish(Err(error));
        }
    }
}

impl Drop for CycleHandle {
    fn drop(&mut self) {
        if let Some(control) = self.control.take() {
            control.finish(Err(ScanError::TaskDropped));
        }
    }
}

impl fmt::Debug for CycleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleHandle")
            .field("pending", &self.control.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AsyncReadingState
// ---------------------------------------------------------------------------

/// Adapter-side owner of the control block and the runner that executes
/// background reads.
pub struct AsyncReadingState {
    control: Arc<Control>,
    runner: Arc<dyn TaskRunner>,
}

impl AsyncReadingState {
    pub fn new(runner: Arc<dyn TaskRunner>, signal: Arc<dyn ReadinessSignal>) -> Self {
        Self {
            control: Arc::new(Control::new(signal)),
            runner,
        }
    }

    /// Begin a cycle. Panics unless the stage is `NotStarted`.
    pub fn start(&self) -> CycleHandle {
        self.control
            .transition(Stage::NotStarted, Stage::InProgress);
        debug!("Background read cycle started");
        CycleHandle {
            control: Some(Arc::clone(&self.control)),
        }
    }

    pub fn schedule(&self, job: Job) {
        self.runner.submit(job);
    }

    /// Collect a finished cycle. Panics unless the stage is `IsFinished`.
    pub fn get_result(&self) -> Result<ChunkAndProgress> {
        let result = self.control.take_result();
        debug!(ok = result.is_ok(), "Background read cycle collected");
        result
    }

    pub fn stage(&self) -> Stage {
        self.control.stage()
    }

    pub fn readiness(&self) -> ReadinessHandle {
        ReadinessHandle::new(Arc::clone(&self.control.signal))
    }
}

impl Drop for AsyncReadingState {
    fn drop(&mut self) {
        // A cycle that is in flight, or finished but not collected, still
        // owes us a signal. Waiting for it keeps teardown ordered after the
        // job's last write to the control block.
        if self.control.stage() != Stage::NotStarted {
            debug!("Waiting for in-flight background read before teardown");
            self.control.signal.wait();
        }
    }
}

impl fmt::Debug for AsyncReadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncReadingState")
            .field("control", &self.control)
            .field("runner", &self.runner)
            .finish()
    }
}
