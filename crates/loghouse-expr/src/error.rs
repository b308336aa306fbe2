//! Expression Compilation Errors
//!
//! Everything here fails at *compile* time, before any record flows.
//! Runtime anomalies (missing fields, malformed values) are not errors:
//! they degrade to null per the engine's error policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("unknown field function: {0}")]
    UnknownFunction(String),

    #[error("unknown comparator: {0}")]
    UnknownComparator(String),

    #[error("bad index parameter: {0}")]
    BadIndex(String),

    #[error("bad {ty} literal: {value}")]
    BadLiteral { ty: String, value: String },

    #[error(transparent)]
    Core(#[from] loghouse_core::Error),
}

pub type Result<T> = std::result::Result<T, ExprError>;
