//! In-memory table read algorithm.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arrow::array::{BooleanArray, RecordBatch};
use arrow::compute::filter_record_batch;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use scanpipe_core::{ChunkAndProgress, ReadAlgorithm, ReadSettings, Result, ScanError};
use tracing::debug;

/// Row filter applied to each batch before it is returned.
pub type RowPredicate =
    Arc<dyn Fn(&RecordBatch) -> std::result::Result<BooleanArray, ArrowError> + Send + Sync>;

/// Serves a fixed list of batches, one per `read()`.
///
/// Progress always counts the whole batch, so a batch whose rows are all
/// filtered out still reports what was read.
pub struct MemoryTableReader {
    name: String,
    schema: SchemaRef,
    settings: ReadSettings,
    batches: Mutex<VecDeque<RecordBatch>>,
    predicate: Option<RowPredicate>,
    latency: Option<Duration>,
    cancelled: AtomicBool,
}

impl MemoryTableReader {
    pub fn new(name: impl Into<String>, schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        let name = name.into();
        if let Some(bad) = batches.iter().position(|b| b.schema() != schema) {
            return Err(ScanError::Config(format!(
                "batch {} of table '{}' does not match the table schema",
                bad, name
            )));
        }
        Ok(Self {
            name,
            schema,
            settings: ReadSettings::default(),
            batches: Mutex::new(batches.into()),
            predicate: None,
            latency: None,
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn with_settings(mut self, settings: ReadSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_predicate(mut self, predicate: RowPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Sleep this long in every `read()`, standing in for storage latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn remaining(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl ReadAlgorithm for MemoryTableReader {
    fn read(&self) -> Result<ChunkAndProgress> {
        self.check_cancelled()?;
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
            self.check_cancelled()?;
        }

        let mut batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(batch) = batches.pop_front() else {
            return Ok(ChunkAndProgress::finished());
        };
        let is_finished = batches.is_empty();
        drop(batches);

        let num_read_rows = batch.num_rows() as u64;
        let num_read_bytes = batch.get_array_memory_size() as u64;
        let batch = match &self.predicate {
            Some(predicate) => {
                let mask = predicate(&batch)?;
                filter_record_batch(&batch, &mask)?
            }
            None => batch,
        };
        debug!(
            table = %self.name,
            read_rows = num_read_rows,
            kept_rows = batch.num_rows(),
            "Read in-memory batch"
        );

        Ok(ChunkAndProgress::from_batch(batch)
            .with_progress(num_read_rows, num_read_bytes)
            .with_finished(is_finished))
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn name(&self) -> String {
        format!("MemoryTableReader({})", self.name)
    }

    fn header(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn settings(&self) -> &ReadSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array};
    use arrow::compute::kernels::cmp::gt;
    use arrow::datatypes::{DataType, Field, Schema};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]))
    }

    fn batch(range: std::ops::Range<i64>) -> RecordBatch {
        RecordBatch::try_new(schema(), vec![Arc::new(Int64Array::from_iter_values(range))]).unwrap()
    }

    #[test]
    fn test_reads_batches_in_order_then_finishes() {
        let reader = MemoryTableReader::new("t", schema(), vec![batch(0..3), batch(3..5)]).unwrap();

        let first = reader.read().unwrap();
        assert_eq!(first.num_rows(), 3);
        assert!(!first.is_finished);

        let second = reader.read().unwrap();
        assert_eq!(second.num_rows(), 2);
        assert!(second.is_finished);

        let after = reader.read().unwrap();
        assert!(after.is_finished);
        assert!(!after.has_progress());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_empty_table_is_finished_immediately() {
        let reader = MemoryTableReader::new("empty", schema(), vec![]).unwrap();
        let chunk = reader.read().unwrap();
        assert!(chunk.is_finished);
        assert!(chunk.chunk.is_none());
    }

    #[test]
    fn test_predicate_filters_rows_but_keeps_progress() {
        let predicate: RowPredicate = Arc::new(|b: &RecordBatch| {
            let ids = b.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
            gt(ids, &Int64Array::new_scalar(100))
        });
        let reader = MemoryTableReader::new("t", schema(), vec![batch(0..10)])
            .unwrap()
            .with_predicate(predicate);

        let chunk = reader.read().unwrap();
        assert!(!chunk.has_rows());
        assert_eq!(chunk.num_read_rows, 10);
        assert!(chunk.num_read_bytes > 0);
    }

    #[test]
    fn test_cancel_makes_next_read_fail() {
        let reader = MemoryTableReader::new("t", schema(), vec![batch(0..3)]).unwrap();
        reader.cancel();
        assert!(matches!(reader.read(), Err(ScanError::Cancelled)));
    }

    #[test]
    fn test_rejects_mismatched_batch_schema() {
        let other = Arc::new(Schema::new(vec![Field::new("name", DataType::Utf8, true)]));
        let err = MemoryTableReader::new("t", other, vec![batch(0..1)]).err().unwrap();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_name_and_header() {
        let reader = MemoryTableReader::new("orders", schema(), vec![]).unwrap();
        assert_eq!(reader.name(), "MemoryTableReader(orders)");
        assert_eq!(reader.header(), schema());
        assert_eq!(reader.header().field(0).name(), "id");
    }
}
