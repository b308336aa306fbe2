//! Top Proc
//!
//! Partial sort: keeps the K largest records by the sort ordering in a
//! K-element min-heap, then emits them in descending order at end of
//! stream. O(N log K) time, O(K) space — `top 10` over a billion records
//! holds ten.
//!
//! `std::collections::BinaryHeap` needs `Ord` elements, and the ordering
//! here is a runtime comparator, so the sift routines are written against
//! the comparator directly.

use async_trait::async_trait;
use loghouse_core::{Batch, Record};
use loghouse_expr::SortFn;

use crate::error::Result;
use crate::proc::Proc;

pub struct TopProc {
    parent: Box<dyn Proc>,
    k: usize,
    cmp: SortFn,
    /// Min-heap on `cmp`: `heap[0]` is the smallest kept record.
    heap: Vec<Record>,
    finished: bool,
}

impl TopProc {
    pub fn new(parent: Box<dyn Proc>, cmp: SortFn, k: u64) -> Self {
        TopProc {
            parent,
            k: k as usize,
            cmp,
            heap: Vec::new(),
            finished: false,
        }
    }

    fn offer(&mut self, record: Record) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(record);
            self.sift_up(self.heap.len() - 1);
        } else if (self.cmp)(&record, &self.heap[0]) == std::cmp::Ordering::Greater {
            self.heap[0] = record;
            self.sift_down(0);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if (self.cmp)(&self.heap[i], &self.heap[parent]) == std::cmp::Ordering::Less {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < self.heap.len()
                && (self.cmp)(&self.heap[left], &self.heap[smallest]) == std::cmp::Ordering::Less
            {
                smallest = left;
            }
            if right < self.heap.len()
                && (self.cmp)(&self.heap[right], &self.heap[smallest]) == std::cmp::Ordering::Less
            {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(i, smallest);
            i = smallest;
        }
    }
}

#[async_trait]
impl Proc for TopProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.parent.pull().await {
                Ok(Some(batch)) => {
                    for record in batch.iter() {
                        self.offer(record.clone());
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    if self.heap.is_empty() {
                        return Ok(None);
                    }
                    let mut records = std::mem::take(&mut self.heap);
                    records.sort_by(|a, b| (self.cmp)(b, a)); // descending
                    return Ok(Some(Batch::new(records)));
                }
                Err(e) => {
                    self.finished = true;
                    self.heap.clear();
                    return Err(e);
                }
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        self.heap.clear();
        self.parent.done().await;
    }
}
