//! Record source abstraction for the sample index.
//!
//! The physical storage engine is external. This module only defines how raw records
//! of a sample are fetched, so that different backends can be used interchangeably.
//!
//! # Implementations
//!
//! - [`InMemoryStore`] - records held in memory, loadable from a JSON file
//!
//! # Example
//!
//! ```no_run
//! use sampleindex::storage::{InMemoryStore, SampleIndexStore};
//! use std::path::Path;
//!
//! # async fn run() -> sampleindex::Result<()> {
//! let store = InMemoryStore::from_path(Path::new("./records.json")).await?;
//! let records = store.records("study1", "NA12878", &[]).await?;
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::InMemoryStore;

use crate::decoder::RawRecord;
use crate::types::Region;
use crate::Result;
use async_trait::async_trait;

/// Source of raw sample index records
#[async_trait]
pub trait SampleIndexStore: Send + Sync {
    /// Records of a sample overlapping any of `regions`, every record when empty.
    /// Records are returned in chromosome and batch order.
    async fn records(&self, study: &str, sample: &str, regions: &[Region]) -> Result<Vec<RawRecord>>;
}
