//! LogHouse Query Execution
//!
//! Compiles a query AST into a graph of pull-based procs and drives it
//! concurrently:
//!
//! ```text
//! readers -> Combiner -> Mapper -> Scanner -> procs ... -> MuxOutput -> driver
//! ```
//!
//! - [`compile`] builds the graph over a record source; parallel subtrees
//!   fan out through tees and land on multiplexer channels.
//! - [`driver::run`] pulls the multiplexer to completion under a
//!   caller-supplied handler, delivering batches, warnings, periodic
//!   scanner stats, and the end event.
//! - [`Combiner`] and [`Mapper`] merge multiple sources and localize
//!   foreign schema identities before the graph sees them.
//!
//! Procs run as tokio tasks coordinated by bounded channels (one batch in
//! flight per edge); cancellation is a broadcast token every stage observes
//! between pulls.

pub mod combiner;
pub mod compile;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod io;
pub mod mapper;
pub mod mux;
pub mod proc;
pub mod procs;
pub mod reducer;
pub mod scanner;

pub use combiner::Combiner;
pub use compile::compile;
pub use config::{DriverConfig, ExecConfig};
pub use context::ExecContext;
pub use driver::{CollectHandler, ControlEvent, DriverHandler};
pub use error::{ExecError, Result};
pub use io::{ArrayReader, Reader, Writer};
pub use mapper::Mapper;
pub use mux::{MuxEvent, MuxOutput};
pub use proc::Proc;
pub use scanner::{Scanner, ScannerStats, StatsSnapshot};
