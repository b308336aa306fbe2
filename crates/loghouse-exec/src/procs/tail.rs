//! Tail Proc
//!
//! Buffers all input and emits the final `count` records once upstream
//! ends. Memory is bounded by `count`: the buffer is a ring that discards
//! from the front as it grows past the limit.

use std::collections::VecDeque;

use async_trait::async_trait;
use loghouse_core::Batch;

use crate::error::Result;
use crate::proc::Proc;

pub struct TailProc {
    parent: Box<dyn Proc>,
    count: usize,
    buffer: VecDeque<loghouse_core::Record>,
    finished: bool,
}

impl TailProc {
    pub fn new(parent: Box<dyn Proc>, count: u64) -> Self {
        TailProc {
            parent,
            count: count as usize,
            buffer: VecDeque::new(),
            finished: false,
        }
    }
}

#[async_trait]
impl Proc for TailProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.parent.pull().await {
                Ok(Some(batch)) => {
                    for record in batch.iter() {
                        if self.buffer.len() == self.count {
                            self.buffer.pop_front();
                        }
                        self.buffer.push_back(record.clone());
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    let records: Vec<_> = std::mem::take(&mut self.buffer).into();
                    return Ok(Some(Batch::new(records)));
                }
                Err(e) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Err(e);
                }
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        self.buffer.clear();
        self.parent.done().await;
    }
}
