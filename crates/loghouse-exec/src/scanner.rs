//! The Leaf Scanner
//!
//! The scanner is the graph's leaf proc: it wraps a [`Reader`], bundles
//! records into batches, applies the predicate the compiler pushed down
//! (when the query starts with a filter), and maintains the running
//! counters the driver samples for periodic stats events.
//!
//! The scanner owns the source's lifecycle: its reader is closed exactly
//! once, whether the input drains, the reader errors, or `done` arrives
//! from downstream (head reached its count, or the query was canceled).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use loghouse_core::Batch;
use loghouse_expr::Filter;
use serde::Serialize;

use crate::context::ExecContext;
use crate::error::Result;
use crate::io::Reader;
use crate::proc::Proc;

/// Running counters maintained by the scanner, shared with the driver.
#[derive(Debug, Default)]
pub struct ScannerStats {
    bytes_read: AtomicU64,
    records_read: AtomicU64,
    records_matched: AtomicU64,
    bytes_matched: AtomicU64,
}

impl ScannerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            records_read: self.records_read.load(Ordering::Relaxed),
            records_matched: self.records_matched.load(Ordering::Relaxed),
            bytes_matched: self.bytes_matched.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the scanner counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub bytes_read: u64,
    pub records_read: u64,
    pub records_matched: u64,
    pub bytes_matched: u64,
}

/// The leaf proc wrapping a record source.
pub struct Scanner {
    reader: Box<dyn Reader>,
    filter: Option<Filter>,
    batch_size: usize,
    stats: Arc<ScannerStats>,
    ctx: ExecContext,
    finished: bool,
    closed: bool,
}

impl Scanner {
    pub fn new(
        ctx: ExecContext,
        reader: Box<dyn Reader>,
        filter: Option<Filter>,
        batch_size: usize,
    ) -> Self {
        Scanner {
            reader,
            filter,
            batch_size: batch_size.max(1),
            stats: Arc::new(ScannerStats::default()),
            ctx,
            finished: false,
            closed: false,
        }
    }

    pub fn stats(&self) -> Arc<ScannerStats> {
        Arc::clone(&self.stats)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.reader.close().await {
                tracing::warn!(error = %e, "scanner: closing reader failed");
            }
        }
    }
}

#[async_trait]
impl Proc for Scanner {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(self.batch_size);
        loop {
            if self.ctx.is_canceled() {
                self.finished = true;
                self.close().await;
                return Ok(None);
            }
            let record = match self.reader.read().await {
                Ok(r) => r,
                Err(e) => {
                    self.finished = true;
                    self.close().await;
                    return Err(e);
                }
            };
            match record {
                Some(record) => {
                    let size = record.payload().len() as u64;
                    self.stats.records_read.fetch_add(1, Ordering::Relaxed);
                    self.stats.bytes_read.fetch_add(size, Ordering::Relaxed);
                    let matched = match &self.filter {
                        Some(filter) => filter(&record),
                        None => true,
                    };
                    if matched {
                        self.stats.records_matched.fetch_add(1, Ordering::Relaxed);
                        self.stats.bytes_matched.fetch_add(size, Ordering::Relaxed);
                        out.push(record);
                        if out.len() == self.batch_size {
                            return Ok(Some(Batch::new(out)));
                        }
                    }
                }
                None => {
                    self.finished = true;
                    self.close().await;
                    if out.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(Batch::new(out)));
                }
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        self.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ArrayReader;
    use loghouse_ast::{BooleanExpr, FieldExpr, TypedValue};
    use loghouse_core::{RecordBuilder, TypeContext};
    use loghouse_expr::compile_filter;

    fn make_records(hosts: &[&str]) -> Vec<loghouse_core::Record> {
        let ctx = TypeContext::new();
        hosts
            .iter()
            .map(|h| {
                let mut b = RecordBuilder::new();
                b.append_string("host", *h);
                b.build(&ctx)
            })
            .collect()
    }

    fn exec_ctx() -> ExecContext {
        ExecContext::new(Arc::new(TypeContext::new())).0
    }

    #[tokio::test]
    async fn test_batches_respect_size() {
        let records = make_records(&["a", "b", "c", "d", "e"]);
        let mut scanner = Scanner::new(exec_ctx(), Box::new(ArrayReader::new(records)), None, 2);

        assert_eq!(scanner.pull().await.unwrap().unwrap().len(), 2);
        assert_eq!(scanner.pull().await.unwrap().unwrap().len(), 2);
        assert_eq!(scanner.pull().await.unwrap().unwrap().len(), 1);
        assert!(scanner.pull().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_count_read_and_matched() {
        let records = make_records(&["a", "b", "a"]);
        let filter = compile_filter(&BooleanExpr::CompareField {
            comparator: "=".to_string(),
            field: FieldExpr::read("host"),
            value: TypedValue::new("string", "a"),
        })
        .unwrap();
        let mut scanner = Scanner::new(
            exec_ctx(),
            Box::new(ArrayReader::new(records)),
            Some(filter),
            100,
        );
        let stats = scanner.stats();

        let batch = scanner.pull().await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(scanner.pull().await.unwrap().is_none());

        let snap = stats.snapshot();
        assert_eq!(snap.records_read, 3);
        assert_eq!(snap.records_matched, 2);
        assert!(snap.bytes_read >= snap.bytes_matched);
        assert!(snap.bytes_matched > 0);
    }

    #[tokio::test]
    async fn test_filter_dropping_everything_yields_eos() {
        let records = make_records(&["x", "y"]);
        let filter = compile_filter(&BooleanExpr::BooleanLiteral { value: false }).unwrap();
        let mut scanner = Scanner::new(
            exec_ctx(),
            Box::new(ArrayReader::new(records)),
            Some(filter),
            100,
        );
        assert!(scanner.pull().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancellation_stops_scan() {
        let records = make_records(&["a"; 50]);
        let ctx = exec_ctx();
        ctx.cancel();
        let mut scanner = Scanner::new(ctx, Box::new(ArrayReader::new(records)), None, 10);
        assert!(scanner.pull().await.unwrap().is_none());
    }
}
