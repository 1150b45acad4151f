//! scanpipe readers - table read algorithms.
//!
//! This crate provides read algorithms for:
//! - In-memory tables (pre-built Arrow batches, optional row filter)
//! - Local CSV files

pub mod csv;
pub mod memory;

pub use csv::CsvFileReader;
pub use memory::{MemoryTableReader, RowPredicate};
