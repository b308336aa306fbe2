//! LogHouse Core
//!
//! The fundamental data model shared by every stage of the LogHouse query
//! engine:
//!
//! - **Types** ([`Type`], [`TypeId`]): the closed set of primitive and
//!   container types a record column may carry.
//! - **Schemas** ([`Schema`], [`Column`]): ordered lists of named, typed
//!   columns, interned into a [`TypeContext`] so that two schemas with
//!   identical column lists share one identity.
//! - **Values** ([`Value`] and the `value` codec): tagged typed values
//!   encoded as length-prefixed byte elements that an iterator can walk
//!   without copying.
//! - **Records** ([`Record`]): an immutable pair of schema identity and
//!   packed byte payload.
//! - **Batches** ([`Batch`]): reference-counted bundles of records with a
//!   time span.
//! - **Time** ([`Ts`], [`Span`]): nanosecond-resolution timestamps.

pub mod batch;
pub mod context;
pub mod error;
pub mod nano;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;
pub mod varint;

pub use batch::Batch;
pub use context::TypeContext;
pub use error::{Error, Result};
pub use nano::{Span, Ts};
pub use record::{Record, RecordBuilder};
pub use schema::{Column, Schema, SchemaId};
pub use types::{Type, TypeId};
pub use value::Value;
