//! Background task runners that execute one blocking read per job.

use std::fmt;
use std::sync::{Arc, OnceLock};

use scanpipe_core::{Result, ScanError};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{info, warn};

/// A zero-argument job run exactly once on a worker thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes submitted jobs on some worker. Submission never blocks and
/// returns nothing; a runner that cannot run a job simply drops it.
pub trait TaskRunner: Send + Sync + fmt::Debug {
    fn submit(&self, job: Job);
}

// ---------------------------------------------------------------------------
// TokioRunner
// ---------------------------------------------------------------------------

/// Runs jobs on the blocking pool of a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioRunner {
    handle: Handle,
}

impl TokioRunner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Runner on the runtime the caller is currently inside.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl TaskRunner for TokioRunner {
    fn submit(&self, job: Job) {
        // The JoinHandle is detached; the job reports through its own control block.
        drop(self.handle.spawn_blocking(job));
    }
}

// ---------------------------------------------------------------------------
// ThreadRunner
// ---------------------------------------------------------------------------

/// Spawns one named OS thread per job.
#[derive(Debug, Clone)]
pub struct ThreadRunner {
    thread_name: String,
}

impl ThreadRunner {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for ThreadRunner {
    fn default() -> Self {
        Self::new("scan-read")
    }
}

impl TaskRunner for ThreadRunner {
    fn submit(&self, job: Job) {
        let spawned = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(job);
        if let Err(e) = spawned {
            // The job was dropped unrun; its cycle finishes with TaskDropped.
            warn!("Failed to spawn {} thread: {}", self.thread_name, e);
        }
    }
}

// ---------------------------------------------------------------------------
// Shared I/O runtime
// ---------------------------------------------------------------------------

static IO_RUNTIME: OnceLock<std::result::Result<Runtime, String>> = OnceLock::new();

/// Runtime whose blocking pool, where reads run, is capped at `io_threads`.
fn build_io_runtime(io_threads: usize) -> std::io::Result<Runtime> {
    let threads = io_threads.max(1);
    Builder::new_multi_thread()
        .worker_threads(threads)
        .max_blocking_threads(threads)
        .thread_name("scan-io")
        .enable_all()
        .build()
}

/// The process-wide I/O runtime, built on first use.
fn io_runtime(io_threads: usize) -> Result<&'static Runtime> {
    let built = IO_RUNTIME.get_or_init(|| {
        let rt = build_io_runtime(io_threads).map_err(|e| e.to_string())?;
        info!("Started shared I/O runtime with {} threads", io_threads.max(1));
        Ok(rt)
    });
    built
        .as_ref()
        .map_err(|msg| ScanError::Config(format!("failed to build I/O runtime: {}", msg)))
}

/// Runner backed by the shared I/O runtime's blocking pool.
///
/// At most `io_threads` reads run at once; further jobs queue. `io_threads`
/// only matters for the call that builds the runtime.
pub fn io_runner(io_threads: usize) -> Result<Arc<dyn TaskRunner>> {
    let rt = io_runtime(io_threads)?;
    Ok(Arc::new(TokioRunner::new(rt.handle().clone())))
}
