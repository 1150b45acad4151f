//! scanpipe core - types shared between read algorithms and scan sources.
//!
//! A read algorithm produces [`ChunkAndProgress`] values on every call to
//! [`ReadAlgorithm::read`]; the source crate drives it either inline or on a
//! background worker.

pub mod algorithm;
pub mod chunk;
pub mod config;
pub mod error;

pub use algorithm::ReadAlgorithm;
pub use chunk::ChunkAndProgress;
pub use config::ReadSettings;
pub use error::{Result, ScanError};

// Re-export for downstream consumers
pub use arrow::array::RecordBatch;
pub use arrow::datatypes::SchemaRef;
