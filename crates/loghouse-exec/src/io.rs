//! Reader and Writer Interfaces
//!
//! Format-specific sources and sinks live outside this crate; these traits
//! are the boundary they implement. A reader yields one record per call
//! until `Ok(None)`; `close` releases whatever the reader holds and is
//! called exactly once, whether the query drains, errors, or is canceled.
//!
//! [`ArrayReader`] is the in-memory implementation the aggregating stages
//! and the test suites use.

use std::collections::VecDeque;

use async_trait::async_trait;
use loghouse_core::Record;

use crate::error::Result;

/// A source of records.
#[async_trait]
pub trait Reader: Send {
    /// The next record, or `Ok(None)` at end of input.
    async fn read(&mut self) -> Result<Option<Record>>;

    /// Release underlying resources. Default: nothing to release.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A sink for records.
#[async_trait]
pub trait Writer: Send {
    async fn write(&mut self, record: &Record) -> Result<()>;

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An in-memory reader over a fixed record sequence.
#[derive(Default)]
pub struct ArrayReader {
    records: VecDeque<Record>,
}

impl ArrayReader {
    pub fn new(records: Vec<Record>) -> Self {
        ArrayReader {
            records: records.into(),
        }
    }
}

#[async_trait]
impl Reader for ArrayReader {
    async fn read(&mut self) -> Result<Option<Record>> {
        Ok(self.records.pop_front())
    }
}
