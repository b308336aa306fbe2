//! Execution Context
//!
//! One [`ExecContext`] per running query, cloned into every stage. It
//! carries the three things a stage may need besides its input:
//!
//! - the query's local [`TypeContext`] for interning output schemas,
//! - the cancellation token the driver owns (a broadcast: every stage
//!   observes it at least between batch pulls),
//! - the warning channel that feeds the driver's control stream.
//!
//! Warnings are fire-and-forget: the channel is unbounded so a stage never
//! blocks on reporting one, and sending after the driver is gone is a no-op.

use std::sync::Arc;

use loghouse_core::TypeContext;
use loghouse_expr::WarnFn;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Shared per-query execution state.
#[derive(Clone)]
pub struct ExecContext {
    types: Arc<TypeContext>,
    cancel: CancellationToken,
    warnings: mpsc::UnboundedSender<String>,
}

impl ExecContext {
    /// Create a context plus the receiving half of its warning channel.
    pub fn new(types: Arc<TypeContext>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (warnings, rx) = mpsc::unbounded_channel();
        (
            ExecContext {
                types,
                cancel: CancellationToken::new(),
                warnings,
            },
            rx,
        )
    }

    pub fn types(&self) -> &Arc<TypeContext> {
        &self.types
    }

    /// Deliver a warning to the driver. Never blocks, never fails.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(warning = %message, "query warning");
        let _ = self.warnings.send(message);
    }

    /// Adapter for the expression compiler's warning hook.
    pub fn warn_fn(&self) -> WarnFn {
        let ctx = self.clone();
        Arc::new(move |msg: &str| ctx.warn(msg))
    }

    /// The cancellation token for this query. Callers hold a clone to set
    /// deadlines or cancel explicitly.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
