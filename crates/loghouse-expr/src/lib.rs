//! Compiled Record Expressions
//!
//! This crate turns AST fragments into compiled closures over records:
//!
//! - [`resolver`]: field-path expressions → accessor functions
//! - [`literal`]: typed literal values → parsed native forms
//! - [`filter`]: boolean expression trees → record predicates
//! - [`sort`]: ordered key lists → record comparators
//!
//! Compilation happens once per query; the resulting closures are pure and
//! `Send + Sync` so the exec crate can run them from any stage task.

pub mod error;
pub mod filter;
pub mod literal;
pub mod resolver;
pub mod sort;

pub use error::{ExprError, Result};
pub use filter::{compile_filter, compile_filter_with_warnings, Filter, WarnFn};
pub use literal::Literal;
pub use resolver::{compile_field_expr, compile_field_path, Resolver};
pub use sort::{compare_values, sort_fn, SortFn, SortKey};
