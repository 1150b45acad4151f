//! The value produced by one call into a read algorithm.

use arrow::array::RecordBatch;

/// Rows produced by a single read, plus the amount of data physically read
/// to produce them.
///
/// The counters are reported even when `chunk` carries no rows, e.g. when
/// every row of a granule was filtered out.
#[derive(Debug, Clone, Default)]
pub struct ChunkAndProgress {
    pub chunk: Option<RecordBatch>,
    pub num_read_rows: u64,
    pub num_read_bytes: u64,
    /// End-of-data marker. A chunk without rows and without this flag only
    /// means "nothing this time".
    pub is_finished: bool,
}

impl ChunkAndProgress {
    /// A chunk whose progress counters equal its own size.
    pub fn from_batch(batch: RecordBatch) -> Self {
        let num_read_rows = batch.num_rows() as u64;
        let num_read_bytes = batch.get_array_memory_size() as u64;
        Self {
            chunk: Some(batch),
            num_read_rows,
            num_read_bytes,
            is_finished: false,
        }
    }

    /// No rows, but `rows`/`bytes` were read.
    pub fn progress_only(num_read_rows: u64, num_read_bytes: u64) -> Self {
        Self {
            chunk: None,
            num_read_rows,
            num_read_bytes,
            is_finished: false,
        }
    }

    /// End of data, no rows and no progress.
    pub fn finished() -> Self {
        Self {
            is_finished: true,
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, num_read_rows: u64, num_read_bytes: u64) -> Self {
        self.num_read_rows = num_read_rows;
        self.num_read_bytes = num_read_bytes;
        self
    }

    pub fn with_finished(mut self, is_finished: bool) -> Self {
        self.is_finished = is_finished;
        self
    }

    pub fn num_rows(&self) -> usize {
        self.chunk.as_ref().map_or(0, |b| b.num_rows())
    }

    pub fn has_rows(&self) -> bool {
        self.num_rows() > 0
    }

    pub fn has_progress(&self) -> bool {
        self.num_read_rows > 0 || self.num_read_bytes > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch(n: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from_iter_values(0..n))]).unwrap()
    }

    #[test]
    fn test_from_batch_counts_rows() {
        let c = ChunkAndProgress::from_batch(batch(7));
        assert_eq!(c.num_rows(), 7);
        assert_eq!(c.num_read_rows, 7);
        assert!(c.num_read_bytes > 0);
        assert!(c.has_rows());
        assert!(!c.is_finished);
    }

    #[test]
    fn test_empty_batch_has_no_rows() {
        let c = ChunkAndProgress::from_batch(batch(0));
        assert!(!c.has_rows());
        assert_eq!(c.num_read_rows, 0);
    }

    #[test]
    fn test_progress_only() {
        let c = ChunkAndProgress::progress_only(100, 4096);
        assert!(!c.has_rows());
        assert!(c.has_progress());
    }

    #[test]
    fn test_finished_marker() {
        let c = ChunkAndProgress::finished();
        assert!(c.is_finished);
        assert!(!c.has_progress());
        assert!(c.chunk.is_none());
    }
}
