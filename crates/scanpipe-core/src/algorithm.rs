//! The read-algorithm seam between table storage and the scan source.

use arrow::datatypes::SchemaRef;

use crate::chunk::ChunkAndProgress;
use crate::config::ReadSettings;
use crate::error::Result;

/// A synchronous, blocking table reader.
///
/// The source never calls `read` from two threads at once: in sync mode it
/// runs on the pipeline thread, in async mode on the single worker that
/// currently owns the cycle. `cancel` may be called from the pipeline thread
/// while a read is running elsewhere, so implementations keep their reader
/// state behind interior mutability and their cancel flag in an atomic.
pub trait ReadAlgorithm: Send + Sync {
    /// Produce the next chunk. Returns a chunk with `is_finished` set once
    /// the data is exhausted.
    fn read(&self) -> Result<ChunkAndProgress>;

    /// Ask the current or next `read` to return promptly.
    fn cancel(&self);

    fn name(&self) -> String;

    /// Schema of the batches this algorithm produces.
    fn header(&self) -> SchemaRef;

    fn settings(&self) -> &ReadSettings;
}
