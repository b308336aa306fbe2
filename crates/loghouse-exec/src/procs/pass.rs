//! Pass Proc
//!
//! Mirrors pulls to its parent unchanged. The compiler emits it for
//! explicit pass stages and as a placeholder for folded-away filters.

use async_trait::async_trait;
use loghouse_core::Batch;

use crate::error::Result;
use crate::proc::Proc;

pub struct PassProc {
    parent: Box<dyn Proc>,
}

impl PassProc {
    pub fn new(parent: Box<dyn Proc>) -> Self {
        PassProc { parent }
    }
}

#[async_trait]
impl Proc for PassProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        self.parent.pull().await
    }

    async fn done(&mut self) {
        self.parent.done().await;
    }
}
