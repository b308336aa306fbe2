//! Error Types for LogHouse Core
//!
//! All decode and schema failures in the core data model surface as
//! [`Error`]. Functions throughout the crate return [`Result`] so callers can
//! propagate with `?`.
//!
//! Decode errors matter to the engine's error policy: a malformed value
//! payload is a *per-record* condition handled by the stage that hit it, not
//! a fatal query error, so every decoder reports exactly what was wrong
//! rather than panicking.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("truncated value: {0}")]
    Truncated(&'static str),

    #[error("malformed value: {0}")]
    Malformed(&'static str),

    #[error("varint overflows 64 bits")]
    VarintOverflow,

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("unknown type name: {0}")]
    UnknownType(String),

    #[error("no such column: {0}")]
    NoSuchColumn(String),

    #[error("value out of range for {0}")]
    OutOfRange(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
