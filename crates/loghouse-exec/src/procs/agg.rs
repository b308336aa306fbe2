//! Reducer Proc
//!
//! Feeds every input record to a fixed set of reducers and, at end of
//! stream, emits a single record with one column per reducer. With an
//! update interval configured, a provisional record carrying the running
//! state is also emitted at that wall-clock cadence while input flows.

use std::time::Duration;

use async_trait::async_trait;
use loghouse_core::{Batch, RecordBuilder};
use tokio::time::Instant;

use crate::context::ExecContext;
use crate::error::Result;
use crate::proc::Proc;
use crate::reducer::{ReducerInst, ReducerSpec};

pub struct AggProc {
    parent: Box<dyn Proc>,
    reducers: Vec<ReducerInst>,
    ctx: ExecContext,
    update_interval: Option<Duration>,
    last_update: Instant,
    finished: bool,
}

impl AggProc {
    pub fn new(
        ctx: ExecContext,
        parent: Box<dyn Proc>,
        specs: &[ReducerSpec],
        update_interval: Option<Duration>,
    ) -> Self {
        AggProc {
            parent,
            reducers: specs.iter().map(ReducerSpec::instantiate).collect(),
            ctx,
            update_interval,
            last_update: Instant::now(),
            finished: false,
        }
    }

    fn result_batch(&self) -> Batch {
        let mut builder = RecordBuilder::new();
        for reducer in &self.reducers {
            builder.append(reducer.name().to_string(), &reducer.result());
        }
        Batch::new(vec![builder.build(self.ctx.types())])
    }
}

#[async_trait]
impl Proc for AggProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.parent.pull().await {
                Ok(Some(batch)) => {
                    for record in batch.iter() {
                        for reducer in &mut self.reducers {
                            reducer.update(record);
                        }
                    }
                    if let Some(interval) = self.update_interval {
                        if self.last_update.elapsed() >= interval {
                            self.last_update = Instant::now();
                            return Ok(Some(self.result_batch()));
                        }
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    return Ok(Some(self.result_batch()));
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        self.parent.done().await;
    }
}
