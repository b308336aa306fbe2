//! The Sink Multiplexer
//!
//! The terminal sink of the compiled graph. Every parallel subtree's
//! terminal proc gets a channel id and its own task that pulls it to
//! completion; results funnel into one bounded queue the driver consumes.
//! End of stream is tracked per channel, and the mux itself ends when every
//! channel has.
//!
//! The pull loop in each task observes the cancellation token between
//! batches: on cancel, the proc's `done` runs (sources close) and the
//! channel ends without error, per the engine's cancellation contract. A
//! panicking proc is caught at the task boundary and surfaces as a fatal
//! error on its channel.

use loghouse_core::Batch;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::ExecContext;
use crate::error::ExecError;
use crate::proc::Proc;
use crate::scanner::{ScannerStats, StatsSnapshot};
use std::sync::Arc;

/// One event pulled from the mux.
#[derive(Debug)]
pub enum MuxEvent {
    Batch { channel: usize, batch: Batch },
    Warning(String),
    End { channel: usize },
    Error { channel: usize, error: ExecError },
}

type ChannelResult = (usize, Result<Option<Batch>, ExecError>);

/// The running graph's output end.
pub struct MuxOutput {
    results: mpsc::Receiver<ChannelResult>,
    warnings: mpsc::UnboundedReceiver<String>,
    monitors: Vec<JoinHandle<()>>,
    live: usize,
    channels: usize,
    cancel: CancellationToken,
    stats: Arc<ScannerStats>,
}

impl MuxOutput {
    /// Spawn one pull task per terminal proc and assemble the mux.
    pub fn new(
        ctx: &ExecContext,
        warnings: mpsc::UnboundedReceiver<String>,
        terminals: Vec<Box<dyn Proc>>,
        stats: Arc<ScannerStats>,
    ) -> Self {
        let channels = terminals.len();
        // One in-flight batch per channel keeps backpressure tight.
        let (tx, results) = mpsc::channel(channels.max(1));
        let mut monitors = Vec::with_capacity(channels);
        for (channel, proc) in terminals.into_iter().enumerate() {
            let worker = tokio::spawn(run_channel(
                channel,
                proc,
                tx.clone(),
                ctx.cancellation(),
            ));
            // The monitor converts a panicked worker into a fatal error on
            // its channel.
            let tx = tx.clone();
            monitors.push(tokio::spawn(async move {
                if let Err(join_err) = worker.await {
                    if join_err.is_panic() {
                        let message = panic_message(join_err.into_panic());
                        tracing::error!(channel, panic = %message, "proc task panicked");
                        let _ = tx.send((channel, Err(ExecError::ProcPanic(message)))).await;
                    }
                }
            }));
        }
        MuxOutput {
            results,
            warnings,
            monitors,
            live: channels,
            channels,
            cancel: ctx.cancellation(),
            stats,
        }
    }

    /// Number of output channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether every channel has ended.
    pub fn complete(&self) -> bool {
        self.live == 0
    }

    /// The query's cancellation token; cancel it to stop the graph.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current scanner counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The next event. Must not be called once [`complete`](Self::complete)
    /// returns true.
    pub async fn pull(&mut self) -> MuxEvent {
        loop {
            tokio::select! {
                warning = self.warnings.recv() => {
                    match warning {
                        Some(w) => return MuxEvent::Warning(w),
                        // All warning senders gone; rely on results alone.
                        None => return self.pull_result().await,
                    }
                }
                result = self.results.recv() => {
                    return self.map_result(result);
                }
            }
        }
    }

    async fn pull_result(&mut self) -> MuxEvent {
        let result = self.results.recv().await;
        self.map_result(result)
    }

    fn map_result(&mut self, result: Option<ChannelResult>) -> MuxEvent {
        match result {
            Some((channel, Ok(Some(batch)))) => MuxEvent::Batch { channel, batch },
            Some((channel, Ok(None))) => {
                self.live = self.live.saturating_sub(1);
                MuxEvent::End { channel }
            }
            Some((channel, Err(error))) => {
                self.live = self.live.saturating_sub(1);
                MuxEvent::Error { channel, error }
            }
            // Every sender dropped without all channels ending: workers
            // died without a word. Treat as a panic-equivalent fatal.
            None => {
                let channel = 0;
                self.live = 0;
                MuxEvent::Error {
                    channel,
                    error: ExecError::ProcPanic("output channel closed".to_string()),
                }
            }
        }
    }

    /// Pending warnings, non-blocking; used to drain after completion.
    pub fn try_warning(&mut self) -> Option<String> {
        self.warnings.try_recv().ok()
    }
}

impl Drop for MuxOutput {
    fn drop(&mut self) {
        // Stop any still-running workers; their next cancellation check
        // closes the sources.
        self.cancel.cancel();
        for monitor in &self.monitors {
            monitor.abort();
        }
    }
}

async fn run_channel(
    channel: usize,
    mut proc: Box<dyn Proc>,
    tx: mpsc::Sender<ChannelResult>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Drop pending state, close sources, end without error.
                proc.done().await;
                let _ = tx.send((channel, Ok(None))).await;
                return;
            }
            result = proc.pull() => match result {
                Ok(Some(batch)) => {
                    if tx.send((channel, Ok(Some(batch)))).await.is_err() {
                        // Receiver gone; shut the chain down.
                        proc.done().await;
                        return;
                    }
                }
                Ok(None) => {
                    let _ = tx.send((channel, Ok(None))).await;
                    return;
                }
                Err(error) => {
                    let _ = tx.send((channel, Err(error))).await;
                    return;
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procs::testutil::{exec_ctx, rec, source};

    async fn collect(mux: &mut MuxOutput) -> (Vec<(usize, Batch)>, Vec<ExecError>) {
        let mut batches = Vec::new();
        let mut errors = Vec::new();
        while !mux.complete() {
            match mux.pull().await {
                MuxEvent::Batch { channel, batch } => batches.push((channel, batch)),
                MuxEvent::Error { error, .. } => errors.push(error),
                MuxEvent::End { .. } | MuxEvent::Warning(_) => {}
            }
        }
        (batches, errors)
    }

    #[tokio::test]
    async fn test_single_channel_to_completion() {
        let (ctx, warnings) = exec_ctx();
        let records = vec![rec(&ctx, 1, "a", 1), rec(&ctx, 2, "b", 2)];
        let terminal = source(&ctx, records);
        let stats = Arc::new(ScannerStats::default());
        let mut mux = MuxOutput::new(&ctx, warnings, vec![terminal], stats);

        assert_eq!(mux.channels(), 1);
        let (batches, errors) = collect(&mut mux).await;
        assert!(errors.is_empty());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, 0);
        assert_eq!(batches[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_multiple_channels_end_independently() {
        let (ctx, warnings) = exec_ctx();
        let a = source(&ctx, vec![rec(&ctx, 1, "a", 1)]);
        let b = source(&ctx, vec![rec(&ctx, 2, "b", 2)]);
        let stats = Arc::new(ScannerStats::default());
        let mut mux = MuxOutput::new(&ctx, warnings, vec![a, b], stats);

        let (batches, errors) = collect(&mut mux).await;
        assert!(errors.is_empty());
        let mut channels: Vec<usize> = batches.iter().map(|(c, _)| *c).collect();
        channels.sort_unstable();
        assert_eq!(channels, vec![0, 1]);
    }

    struct PanickingProc;

    #[async_trait::async_trait]
    impl Proc for PanickingProc {
        async fn pull(&mut self) -> crate::error::Result<Option<Batch>> {
            panic!("boom");
        }
        async fn done(&mut self) {}
    }

    #[tokio::test]
    async fn test_panic_becomes_fatal_error() {
        let (ctx, warnings) = exec_ctx();
        let stats = Arc::new(ScannerStats::default());
        let mut mux = MuxOutput::new(&ctx, warnings, vec![Box::new(PanickingProc)], stats);

        let (_, errors) = collect(&mut mux).await;
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            ExecError::ProcPanic(msg) => assert!(msg.contains("boom")),
            other => panic!("expected panic error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_warnings_interleave() {
        let (ctx, warnings) = exec_ctx();
        ctx.warn("early warning");
        let terminal = source(&ctx, vec![rec(&ctx, 1, "a", 1)]);
        let stats = Arc::new(ScannerStats::default());
        let mut mux = MuxOutput::new(&ctx, warnings, vec![terminal], stats);

        let mut saw_warning = false;
        while !mux.complete() {
            if let MuxEvent::Warning(w) = mux.pull().await {
                saw_warning = w == "early warning";
            }
        }
        assert!(saw_warning);
    }
}
