//! The Driver
//!
//! Runs a compiled query to completion, dispatching everything the mux
//! produces to the caller's handler:
//!
//! - `start(id)` once, up front
//! - `batch(channel, batch)` per output batch
//! - `control(event)` for warnings, periodic scanner stats, and per-channel
//!   end notices
//! - `end(id, error)` once, last
//!
//! Stats are sampled on a fixed cadence (default 500 ms). The driver
//! enforces no timeout of its own; the caller arms a deadline on the
//! cancellation token obtained from [`MuxOutput::cancellation`]. On
//! cancellation the graph winds down without error — sources close, procs
//! drain — and the driver reports the cancellation as the end cause.

use async_trait::async_trait;
use loghouse_core::Batch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::DriverConfig;
use crate::error::{ExecError, Result};
use crate::mux::{MuxEvent, MuxOutput};
use crate::scanner::StatsSnapshot;

/// Out-of-band events delivered through `control`.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// A non-fatal anomaly somewhere in the graph.
    Warning(String),
    /// Periodic scanner counters.
    Stats(StatsSnapshot),
    /// One output channel finished.
    ChannelEnd { channel: usize, reason: String },
}

/// The caller's side of a running query.
#[async_trait]
pub trait DriverHandler: Send {
    async fn start(&mut self, id: u64) -> Result<()>;
    async fn batch(&mut self, channel: usize, batch: Batch) -> Result<()>;
    async fn control(&mut self, event: ControlEvent) -> Result<()>;
    async fn end(&mut self, id: u64, error: Option<&ExecError>) -> Result<()>;
}

/// Drive `mux` until every channel ends, a fatal error surfaces, or the
/// query is canceled. The first fatal error (including cancellation) is
/// both reported to the handler and returned.
pub async fn run(
    mut mux: MuxOutput,
    handler: &mut dyn DriverHandler,
    config: DriverConfig,
) -> Result<()> {
    let cancel = mux.cancellation();
    let result = run_inner(&mut mux, handler, config).await;
    if result.is_err() {
        // A fatal error stops the rest of the graph too.
        cancel.cancel();
    }
    result
}

async fn run_inner(
    mux: &mut MuxOutput,
    handler: &mut dyn DriverHandler,
    config: DriverConfig,
) -> Result<()> {
    handler.start(0).await?;

    let cancel = mux.cancellation();
    let mut ticker = interval_at(
        Instant::now() + config.stats_interval,
        config.stats_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut failure: Option<ExecError> = None;
    while !mux.complete() && failure.is_none() {
        tokio::select! {
            _ = ticker.tick() => {
                handler.control(ControlEvent::Stats(mux.stats())).await?;
            }
            event = mux.pull() => match event {
                MuxEvent::Batch { channel, batch } => {
                    handler.batch(channel, batch).await?;
                }
                MuxEvent::Warning(warning) => {
                    tracing::debug!(warning = %warning, "delivering warning");
                    handler.control(ControlEvent::Warning(warning)).await?;
                }
                MuxEvent::End { channel } => {
                    handler
                        .control(ControlEvent::ChannelEnd {
                            channel,
                            reason: "eof".to_string(),
                        })
                        .await?;
                }
                MuxEvent::Error { channel, error } => {
                    tracing::warn!(channel, error = %error, "query failed");
                    failure = Some(error);
                }
            }
        }
    }

    // Anything still queued on the warning channel belongs to this query.
    while let Some(warning) = mux.try_warning() {
        handler.control(ControlEvent::Warning(warning)).await?;
    }
    handler.control(ControlEvent::Stats(mux.stats())).await?;

    let failure = match failure {
        Some(e) => Some(e),
        None if cancel.is_cancelled() => Some(ExecError::Canceled),
        None => None,
    };
    handler.end(0, failure.as_ref()).await?;
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// A handler that collects everything in memory. Useful for tests and for
/// callers that want the whole result at once.
#[derive(Default)]
pub struct CollectHandler {
    pub batches: Vec<(usize, Batch)>,
    pub warnings: Vec<String>,
    pub stats: Vec<StatsSnapshot>,
    pub ended_channels: Vec<usize>,
    pub started: bool,
    pub end_error: Option<String>,
}

impl CollectHandler {
    pub fn new() -> Self {
        CollectHandler::default()
    }

    /// All records delivered on `channel`, flattened in arrival order.
    pub fn records(&self, channel: usize) -> Vec<loghouse_core::Record> {
        self.batches
            .iter()
            .filter(|(c, _)| *c == channel)
            .flat_map(|(_, b)| b.records().iter().cloned())
            .collect()
    }
}

#[async_trait]
impl DriverHandler for CollectHandler {
    async fn start(&mut self, _id: u64) -> Result<()> {
        self.started = true;
        Ok(())
    }

    async fn batch(&mut self, channel: usize, batch: Batch) -> Result<()> {
        self.batches.push((channel, batch));
        Ok(())
    }

    async fn control(&mut self, event: ControlEvent) -> Result<()> {
        match event {
            ControlEvent::Warning(w) => self.warnings.push(w),
            ControlEvent::Stats(s) => self.stats.push(s),
            ControlEvent::ChannelEnd { channel, .. } => self.ended_channels.push(channel),
        }
        Ok(())
    }

    async fn end(&mut self, _id: u64, error: Option<&ExecError>) -> Result<()> {
        self.end_error = error.map(|e| e.to_string());
        Ok(())
    }
}
