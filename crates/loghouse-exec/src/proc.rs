//! The Proc Contract
//!
//! A proc is a pull-based processing stage. Its single operation is *pull
//! next batch*, with three outcomes:
//!
//! - `Ok(Some(batch))` — a batch; keep pulling
//! - `Ok(None)` — end of stream
//! - `Err(e)` — a fatal error, propagated exactly once; every later pull
//!   must return end of stream
//!
//! A pull runs on the caller's task and may block on upstream, but a stage
//! never spins and never holds a lock across a pull.
//!
//! `done` travels the other way: it tells a proc that nothing downstream
//! will pull again, so it can release buffered batches and propagate the
//! signal upstream until the leaf scanner closes its source. Head uses it to
//! cancel upstream early; the runtime uses it on query cancellation.
//!
//! Parents are fixed at construction. A stage never has two consumers
//! directly; parallel fan-out goes through the tee the compiler inserts.

use async_trait::async_trait;
use loghouse_core::Batch;

use crate::error::Result;

/// A pull-based stage in the query graph.
#[async_trait]
pub trait Proc: Send {
    /// Pull the next batch. See the module docs for the outcome contract.
    async fn pull(&mut self) -> Result<Option<Batch>>;

    /// Signal that no further pulls will happen. Implementations drop any
    /// buffered state and forward the signal to their parent.
    async fn done(&mut self);
}
