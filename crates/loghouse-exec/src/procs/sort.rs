//! Sort Proc
//!
//! A stable, bounded-memory sort. Records accumulate up to `limit`; at end
//! of input they are sorted and drained in batches. If the limit is hit
//! first, whatever was collected is sorted and emitted, a warning is
//! raised, and the stage degrades to passthrough for the rest of the
//! stream — an unbounded input never exhausts memory here.

use std::collections::VecDeque;

use async_trait::async_trait;
use loghouse_core::{Batch, Record};
use loghouse_expr::SortFn;

use crate::context::ExecContext;
use crate::error::Result;
use crate::proc::Proc;

enum Phase {
    /// Accumulating input.
    Fill,
    /// Emitting sorted output.
    Drain,
    /// Limit exceeded; forwarding input unsorted.
    Passthrough,
    Finished,
}

pub struct SortProc {
    parent: Box<dyn Proc>,
    cmp: SortFn,
    limit: usize,
    batch_size: usize,
    ctx: ExecContext,
    buffer: Vec<Record>,
    ready: VecDeque<Batch>,
    phase: Phase,
}

impl SortProc {
    pub fn new(
        ctx: ExecContext,
        parent: Box<dyn Proc>,
        cmp: SortFn,
        limit: usize,
        batch_size: usize,
    ) -> Self {
        SortProc {
            parent,
            cmp,
            limit: limit.max(1),
            batch_size: batch_size.max(1),
            ctx,
            buffer: Vec::new(),
            ready: VecDeque::new(),
            phase: Phase::Fill,
        }
    }

    fn sort_and_stage(&mut self) {
        let mut records = std::mem::take(&mut self.buffer);
        // Vec::sort_by is stable: ties keep input order.
        records.sort_by(|a, b| (self.cmp)(a, b));
        for chunk in records.chunks(self.batch_size) {
            self.ready.push_back(Batch::new(chunk.to_vec()));
        }
    }
}

#[async_trait]
impl Proc for SortProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        loop {
            match self.phase {
                Phase::Finished => return Ok(None),
                Phase::Drain => match self.ready.pop_front() {
                    Some(batch) => return Ok(Some(batch)),
                    None => {
                        self.phase = Phase::Finished;
                        return Ok(None);
                    }
                },
                Phase::Passthrough => {
                    if let Some(batch) = self.ready.pop_front() {
                        return Ok(Some(batch));
                    }
                    return match self.parent.pull().await {
                        Ok(Some(batch)) => Ok(Some(batch)),
                        Ok(None) => {
                            self.phase = Phase::Finished;
                            Ok(None)
                        }
                        Err(e) => {
                            self.phase = Phase::Finished;
                            Err(e)
                        }
                    };
                }
                Phase::Fill => match self.parent.pull().await {
                    Ok(Some(batch)) => {
                        self.buffer.extend(batch.iter().cloned());
                        if self.buffer.len() >= self.limit {
                            self.ctx.warn("sort limit reached");
                            self.sort_and_stage();
                            self.phase = Phase::Passthrough;
                        }
                    }
                    Ok(None) => {
                        self.sort_and_stage();
                        self.phase = Phase::Drain;
                    }
                    Err(e) => {
                        self.phase = Phase::Finished;
                        self.buffer.clear();
                        return Err(e);
                    }
                },
            }
        }
    }

    async fn done(&mut self) {
        self.phase = Phase::Finished;
        self.buffer.clear();
        self.ready.clear();
        self.parent.done().await;
    }
}
