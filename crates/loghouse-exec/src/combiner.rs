//! Combiner: Merging Multiple Sources
//!
//! The combiner presents several readers as one. When ordering is on, each
//! read hands out the record with the smallest timestamp across sources
//! (largest under reverse), which keeps a time-ordered merge time-ordered;
//! otherwise sources are drained round-robin.
//!
//! A failing reader either fails the whole query (`stop_on_error`) or is
//! closed, dropped, and reported as a warning while the merge continues with
//! the remaining sources.

use async_trait::async_trait;
use loghouse_core::{Record, Ts};

use crate::context::ExecContext;
use crate::error::Result;
use crate::io::Reader;

struct Source {
    reader: Box<dyn Reader>,
    /// The next record, pre-read so ordered merging can compare timestamps.
    pending: Option<Record>,
    /// Whether `pending` has been filled since the last take.
    primed: bool,
}

/// Merges multiple readers into one stream.
pub struct Combiner {
    sources: Vec<Option<Source>>,
    ordered: bool,
    reverse: bool,
    stop_on_error: bool,
    ctx: ExecContext,
    /// Round-robin cursor for unordered merging.
    cursor: usize,
    closed: bool,
}

impl Combiner {
    pub fn new(
        ctx: ExecContext,
        readers: Vec<Box<dyn Reader>>,
        ordered: bool,
        reverse: bool,
        stop_on_error: bool,
    ) -> Self {
        Combiner {
            sources: readers
                .into_iter()
                .map(|reader| {
                    Some(Source {
                        reader,
                        pending: None,
                        primed: false,
                    })
                })
                .collect(),
            ordered,
            reverse,
            stop_on_error,
            ctx,
            cursor: 0,
            closed: false,
        }
    }

    /// Fill `pending` on the source at `index`. On reader failure, either
    /// propagate (stop-on-error) or warn and drop the source.
    async fn prime(&mut self, index: usize) -> Result<()> {
        let source = match &mut self.sources[index] {
            Some(s) if !s.primed => s,
            _ => return Ok(()),
        };
        match source.reader.read().await {
            Ok(record) => {
                source.pending = record;
                source.primed = true;
                Ok(())
            }
            Err(e) => {
                if self.stop_on_error {
                    return Err(e);
                }
                self.ctx.warn(format!("input source failed: {}", e));
                let mut dead = self.sources[index].take().expect("source present");
                if let Err(close_err) = dead.reader.close().await {
                    tracing::warn!(error = %close_err, "combiner: closing failed source");
                }
                Ok(())
            }
        }
    }

    fn take(&mut self, index: usize) -> Option<Record> {
        let source = self.sources[index].as_mut()?;
        source.primed = false;
        source.pending.take()
    }

    async fn read_ordered(&mut self) -> Result<Option<Record>> {
        for i in 0..self.sources.len() {
            self.prime(i).await?;
        }
        let mut best: Option<(usize, Option<Ts>)> = None;
        for (i, source) in self.sources.iter().enumerate() {
            let record = match source.as_ref().and_then(|s| s.pending.as_ref()) {
                Some(r) => r,
                None => continue,
            };
            let ts = record.ts();
            let better = match &best {
                None => true,
                Some((_, best_ts)) => {
                    if self.reverse {
                        ts > *best_ts
                    } else {
                        // Records without a timestamp drain first.
                        ts.map_or(true, |t| best_ts.map_or(false, |b| t < b))
                    }
                }
            };
            if better {
                best = Some((i, ts));
            }
        }
        Ok(best.and_then(|(i, _)| self.take(i)))
    }

    async fn read_round_robin(&mut self) -> Result<Option<Record>> {
        let n = self.sources.len();
        for step in 0..n {
            let i = (self.cursor + step) % n;
            self.prime(i).await?;
            if let Some(record) = self.take(i) {
                self.cursor = (i + 1) % n;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Reader for Combiner {
    async fn read(&mut self) -> Result<Option<Record>> {
        if self.sources.iter().all(Option::is_none) {
            return Ok(None);
        }
        if self.ordered {
            self.read_ordered().await
        } else {
            self.read_round_robin().await
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for source in self.sources.iter_mut() {
            if let Some(mut s) = source.take() {
                s.reader.close().await?;
            }
        }
        Ok(())
    }
}
