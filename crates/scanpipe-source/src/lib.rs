//! scanpipe source - pull-based scan source with optional background reads.
//!
//! - [`ScanSource`]: the adapter between a [`ReadAlgorithm`](scanpipe_core::ReadAlgorithm)
//!   and a pipeline scheduler
//! - [`AsyncReadingState`]: the control block shared with background reads
//! - [`ReadinessSignal`] / [`ReadinessHandle`]: completion signalling
//! - [`TaskRunner`]: where background reads execute
//! - [`driver`]: loops that drive a source the way a scheduler would

pub mod async_state;
pub mod driver;
pub mod metrics;
pub mod readiness;
pub mod runner;
pub mod source;

pub use async_state::{AsyncReadingState, CycleHandle, Stage};
pub use driver::{drive, drive_blocking, drive_into, ScanSummary};
pub use metrics::ScanMetrics;
pub use readiness::{Event, ReadinessHandle, ReadinessSignal};
pub use runner::{io_runner, Job, TaskRunner, ThreadRunner, TokioRunner};
pub use source::{Progress, ScanSource, Source, Status};
