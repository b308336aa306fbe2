//! Batches
//!
//! A [`Batch`] is a reference-counted bundle of records plus the time span
//! the records cover. The ref/unref ownership contract maps onto `Arc`:
//! cloning a batch is *ref*, dropping a clone is *unref*, and the storage is
//! released when the last clone goes away. Producers hand clones downstream;
//! consumers just drop them.
//!
//! Records within one batch may carry heterogeneous schemas.

use std::sync::Arc;

use crate::nano::Span;
use crate::record::Record;

#[derive(Debug)]
struct Inner {
    records: Vec<Record>,
    span: Option<Span>,
}

/// A reference-counted sequence of records with a time span.
#[derive(Debug, Clone)]
pub struct Batch {
    inner: Arc<Inner>,
}

impl Batch {
    /// Bundle records, computing the span from the records' `ts` columns.
    /// Records without a timestamp do not contribute; a batch where no
    /// record carries `ts` has no span.
    pub fn new(records: Vec<Record>) -> Self {
        let mut span: Option<Span> = None;
        for ts in records.iter().filter_map(|r| r.ts()) {
            match &mut span {
                None => span = Some(Span::instant(ts)),
                Some(s) => s.extend(ts),
            }
        }
        Batch {
            inner: Arc::new(Inner { records, span }),
        }
    }

    /// Bundle records with a precomputed span.
    pub fn with_span(records: Vec<Record>, span: Option<Span>) -> Self {
        Batch {
            inner: Arc::new(Inner { records, span }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.inner.records.get(index)
    }

    pub fn records(&self) -> &[Record] {
        &self.inner.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.inner.records.iter()
    }

    pub fn span(&self) -> Option<Span> {
        self.inner.span
    }
}
