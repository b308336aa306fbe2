//! Uniq Proc
//!
//! Drops any record whose raw payload equals the previous record's, like
//! the shell's `uniq` over adjacent lines. With the count flag, each run's
//! representative record is emitted with an appended `count: uint64` column
//! holding the run length.

use async_trait::async_trait;
use loghouse_core::{Batch, Column, Record, RecordBuilder};

use crate::context::ExecContext;
use crate::error::Result;
use crate::proc::Proc;

pub struct UniqProc {
    parent: Box<dyn Proc>,
    cflag: bool,
    ctx: ExecContext,
    /// Representative of the current run and its length.
    run: Option<(Record, u64)>,
    parent_done: bool,
    finished: bool,
}

impl UniqProc {
    pub fn new(ctx: ExecContext, parent: Box<dyn Proc>, cflag: bool) -> Self {
        UniqProc {
            parent,
            cflag,
            ctx,
            run: None,
            parent_done: false,
            finished: false,
        }
    }

    fn emit(&self, record: Record, count: u64) -> Record {
        if !self.cflag {
            return record;
        }
        let mut builder = RecordBuilder::new();
        let mut elements = record.elements();
        for column in record.schema().columns() {
            let bytes = match elements.next() {
                Some(Ok(elem)) => elem.bytes.map(|b| b.to_vec()),
                _ => None,
            };
            builder.append_encoded(
                Column::new(column.name.clone(), column.ty.clone()),
                bytes.as_deref(),
            );
        }
        builder.append_uint64("count", count);
        builder.build(self.ctx.types())
    }
}

#[async_trait]
impl Proc for UniqProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            if self.parent_done {
                self.finished = true;
                if let Some((record, count)) = self.run.take() {
                    return Ok(Some(Batch::new(vec![self.emit(record, count)])));
                }
                return Ok(None);
            }
            let batch = match self.parent.pull().await {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    self.parent_done = true;
                    continue;
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            };
            let mut out = Vec::new();
            for record in batch.iter() {
                match &mut self.run {
                    Some((prev, count)) if prev.payload() == record.payload() => {
                        *count += 1;
                    }
                    _ => {
                        if let Some((prev, count)) = self.run.take() {
                            out.push(self.emit(prev, count));
                        }
                        self.run = Some((record.clone(), 1));
                    }
                }
            }
            if !out.is_empty() {
                return Ok(Some(Batch::new(out)));
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        self.run = None;
        self.parent.done().await;
    }
}
