//! Execution Errors
//!
//! ## Error Categories
//!
//! The engine distinguishes three severities; only the first lives here:
//!
//! - **Fatal** ([`ExecError`]): cancellation, compile rejections, reader
//!   failures under stop-on-error, schema corruption, proc panics. These
//!   propagate up through the driver and end the query.
//! - **Per-record decode**: handled by the stage that hit them; the affected
//!   comparison degrades to null and the record flows on.
//! - **Warnings**: delivered on the driver's warning channel; never
//!   terminate anything.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] loghouse_core::Error),

    #[error(transparent)]
    Expr(#[from] loghouse_expr::ExprError),

    #[error("compile: {0}")]
    Compile(String),

    #[error("read: {0}")]
    Read(String),

    #[error("query canceled")]
    Canceled,

    #[error("stage panicked: {0}")]
    ProcPanic(String),
}

pub type Result<T> = std::result::Result<T, ExecError>;
