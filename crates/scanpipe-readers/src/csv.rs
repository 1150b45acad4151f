//! Local CSV file read algorithm.
//!
//! Reads the file in batches of `settings.batch_size` rows through Arrow's
//! CSV reader. Progress bytes are the bytes actually pulled from the file,
//! which run ahead of the rows decoded so far because of buffering.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arrow::csv::reader::{Format, Reader};
use arrow::csv::ReaderBuilder;
use arrow::datatypes::SchemaRef;
use scanpipe_core::{ChunkAndProgress, ReadAlgorithm, ReadSettings, Result, ScanError};
use tracing::{debug, info};

/// Records sampled for schema inference.
const INFER_SCHEMA_RECORDS: usize = 1000;

// ---------------------------------------------------------------------------
// CountingReader
// ---------------------------------------------------------------------------

/// Counts bytes read from the wrapped reader into a shared counter.
struct CountingReader<R> {
    inner: R,
    bytes: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// CsvFileReader
// ---------------------------------------------------------------------------

struct CsvState {
    /// `None` once the file is exhausted.
    reader: Option<Reader<CountingReader<File>>>,
    reported_bytes: u64,
}

pub struct CsvFileReader {
    path: PathBuf,
    schema: SchemaRef,
    settings: ReadSettings,
    state: Mutex<CsvState>,
    bytes_read: Arc<AtomicU64>,
    cancelled: AtomicBool,
}

impl CsvFileReader {
    /// Open `path`, inferring the schema from its header and first records.
    pub fn open(path: impl AsRef<Path>, settings: ReadSettings) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let (schema, sampled) = Format::default()
            .with_header(true)
            .infer_schema(&mut file, Some(INFER_SCHEMA_RECORDS))?;
        file.rewind()?;
        let schema = Arc::new(schema);

        let bytes_read = Arc::new(AtomicU64::new(0));
        let reader = ReaderBuilder::new(Arc::clone(&schema))
            .with_header(true)
            .with_batch_size(settings.batch_size.max(1))
            .build(CountingReader {
                inner: file,
                bytes: Arc::clone(&bytes_read),
            })?;

        info!(
            "Opened CSV {:?}: {} columns inferred from {} records",
            path,
            schema.fields().len(),
            sampled
        );

        Ok(Self {
            path,
            schema,
            settings,
            state: Mutex::new(CsvState {
                reader: Some(reader),
                reported_bytes: 0,
            }),
            bytes_read,
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadAlgorithm for CsvFileReader {
    fn read(&self) -> Result<ChunkAndProgress> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(ScanError::Cancelled);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match state.reader.as_mut() {
            Some(reader) => reader.next(),
            None => return Ok(ChunkAndProgress::finished()),
        };

        let total = self.bytes_read.load(Ordering::Relaxed);
        let num_read_bytes = total - state.reported_bytes;
        state.reported_bytes = total;

        match next {
            Some(batch) => {
                let batch = batch?;
                debug!("CsvFileReader: {} rows from {:?}", batch.num_rows(), self.path);
                let num_read_rows = batch.num_rows() as u64;
                Ok(ChunkAndProgress::from_batch(batch).with_progress(num_read_rows, num_read_bytes))
            }
            None => {
                state.reader = None;
                Ok(ChunkAndProgress::progress_only(0, num_read_bytes).with_finished(true))
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn name(&self) -> String {
        format!("CsvFileReader({})", self.path.display())
    }

    fn header(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn settings(&self) -> &ReadSettings {
        &self.settings
    }
}
