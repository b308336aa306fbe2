//! Head Proc
//!
//! Forwards at most `count` records, then ends the stream and signals
//! `done` upstream so the source stops reading — a query like `head 5` over
//! a terabyte of logs touches only the first few batches.

use async_trait::async_trait;
use loghouse_core::Batch;

use crate::error::Result;
use crate::proc::Proc;

pub struct HeadProc {
    parent: Box<dyn Proc>,
    count: u64,
    seen: u64,
    finished: bool,
}

impl HeadProc {
    pub fn new(parent: Box<dyn Proc>, count: u64) -> Self {
        HeadProc {
            parent,
            count,
            seen: 0,
            finished: false,
        }
    }
}

#[async_trait]
impl Proc for HeadProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        let batch = match self.parent.pull().await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                self.finished = true;
                return Ok(None);
            }
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };
        let remaining = self.count - self.seen;
        if (batch.len() as u64) < remaining {
            self.seen += batch.len() as u64;
            return Ok(Some(batch));
        }
        // This batch completes the count: truncate and cancel upstream.
        self.finished = true;
        self.parent.done().await;
        let records = batch.records()[..remaining as usize].to_vec();
        Ok(Some(Batch::new(records)))
    }

    async fn done(&mut self) {
        self.finished = true;
        self.parent.done().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecContext;
    use crate::procs::testutil::{drain, exec_ctx, ns, rec, source};
    use loghouse_core::Record;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_truncates_at_count() {
        let (ctx, _rx) = exec_ctx();
        let records = vec![
            rec(&ctx, 1, "a", 1),
            rec(&ctx, 2, "b", 2),
            rec(&ctx, 3, "c", 3),
        ];
        let mut proc = HeadProc::new(source(&ctx, records), 2);
        assert_eq!(ns(&drain(&mut proc).await), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_short_input_passes_through() {
        let (ctx, _rx) = exec_ctx();
        let records = vec![rec(&ctx, 1, "a", 1)];
        let mut proc = HeadProc::new(source(&ctx, records), 10);
        assert_eq!(ns(&drain(&mut proc).await), vec![1]);
    }

    /// A mock upstream that records how many pulls and dones it sees.
    struct CountingSource {
        ctx: ExecContext,
        pulls: Arc<AtomicU64>,
        dones: Arc<AtomicU64>,
        next: i64,
    }

    #[async_trait]
    impl Proc for CountingSource {
        async fn pull(&mut self) -> Result<Option<Batch>> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            self.next += 1;
            let records: Vec<Record> = vec![rec(&self.ctx, self.next, "a", self.next)];
            Ok(Some(Batch::new(records)))
        }

        async fn done(&mut self) {
            self.dones.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_upstream_sees_done_after_count() {
        let (ctx, _rx) = exec_ctx();
        let pulls = Arc::new(AtomicU64::new(0));
        let dones = Arc::new(AtomicU64::new(0));
        let upstream = CountingSource {
            ctx: ctx.clone(),
            pulls: Arc::clone(&pulls),
            dones: Arc::clone(&dones),
            next: 0,
        };
        let mut proc = HeadProc::new(Box::new(upstream), 2);
        let out = drain(&mut proc).await;
        assert_eq!(out.len(), 2);
        // One batch per pull: exactly two pulls, then upstream cancel.
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
        assert_eq!(dones.load(Ordering::SeqCst), 1);
    }
}
