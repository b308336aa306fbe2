//! The Reducer Library
//!
//! A reducer is an associative accumulator over one field of the input
//! stream: state, an update applied per record, and a finalize that yields
//! one typed value. The set of kinds is closed — dispatch is a match on the
//! kind, not open extension.
//!
//! | kind          | state                  | final value        |
//! |---------------|------------------------|--------------------|
//! | count         | u64                    | uint64             |
//! | sum           | widest of inputs       | int64/uint64/float64 |
//! | min / max     | same as inputs         | same               |
//! | avg           | (sum, count)           | float64            |
//! | first / last  | copy of value          | input type         |
//! | countdistinct | set of encodings       | uint64             |
//!
//! Numeric state promotes per IEEE rules: any float seen makes the state
//! float; otherwise any signed input makes it signed; otherwise it stays
//! unsigned. Updates are total: null inputs are skipped (except bare
//! `count()`, which counts records), and a value whose bytes fail to decode
//! is skipped the same way.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use loghouse_core::{value, Record, Type, Value};
use loghouse_expr::resolver::compile_field_path;

use crate::error::{ExecError, Result};

/// A field accessor shared across group instances.
pub type SharedResolver = Arc<dyn Fn(&Record) -> Option<Value> + Send + Sync>;

/// The closed set of reducer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    First,
    Last,
    CountDistinct,
}

impl ReducerKind {
    pub fn parse(op: &str) -> Option<ReducerKind> {
        match op {
            "count" => Some(ReducerKind::Count),
            "sum" => Some(ReducerKind::Sum),
            "min" => Some(ReducerKind::Min),
            "max" => Some(ReducerKind::Max),
            "avg" => Some(ReducerKind::Avg),
            "first" => Some(ReducerKind::First),
            "last" => Some(ReducerKind::Last),
            "countdistinct" => Some(ReducerKind::CountDistinct),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReducerKind::Count => "count",
            ReducerKind::Sum => "sum",
            ReducerKind::Min => "min",
            ReducerKind::Max => "max",
            ReducerKind::Avg => "avg",
            ReducerKind::First => "first",
            ReducerKind::Last => "last",
            ReducerKind::CountDistinct => "countdistinct",
        }
    }
}

/// A compiled reducer definition, instantiable once per group.
pub struct ReducerSpec {
    kind: ReducerKind,
    /// Output column name.
    name: String,
    resolver: Option<SharedResolver>,
}

impl ReducerSpec {
    /// Compile an AST reducer node. Every kind except `count` requires a
    /// field.
    pub fn compile(node: &loghouse_ast::Reducer) -> Result<ReducerSpec> {
        let kind = ReducerKind::parse(&node.op)
            .ok_or_else(|| ExecError::Compile(format!("unknown reducer: {}", node.op)))?;
        let resolver = match &node.field {
            Some(field) => Some(SharedResolver::from(compile_field_path(field))),
            None => {
                if kind != ReducerKind::Count {
                    return Err(ExecError::Compile(format!(
                        "reducer {} requires a field",
                        kind.name()
                    )));
                }
                None
            }
        };
        let name = if node.var.is_empty() {
            kind.name().to_string()
        } else {
            node.var.clone()
        };
        Ok(ReducerSpec {
            kind,
            name,
            resolver,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> ReducerInst {
        ReducerInst {
            kind: self.kind,
            name: self.name.clone(),
            resolver: self.resolver.clone(),
            state: State::initial(self.kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Numeric state with IEEE-style promotion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl Num {
    fn of(v: &Value) -> Option<Num> {
        let bytes = v.bytes.as_deref()?;
        match &v.ty {
            Type::Float64 => value::decode_float64(bytes).ok().map(Num::Float),
            ty if ty.is_signed() => value::decode_int(bytes).ok().map(Num::Int),
            ty if ty.is_unsigned() => value::decode_uint(bytes).ok().map(Num::Uint),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(v) => v as f64,
            Num::Uint(v) => v as f64,
            Num::Float(v) => v,
        }
    }

    /// Promote a pair to a common representation: float wins, then signed.
    fn promote(a: Num, b: Num) -> (Num, Num) {
        use Num::*;
        match (a, b) {
            (Float(_), _) | (_, Float(_)) => (Float(a.as_f64()), Float(b.as_f64())),
            (Int(_), Uint(y)) => (a, Int(clamp_u64(y))),
            (Uint(x), Int(_)) => (Int(clamp_u64(x)), b),
            _ => (a, b),
        }
    }

    fn add(a: Num, b: Num) -> Num {
        match Num::promote(a, b) {
            (Num::Int(x), Num::Int(y)) => Num::Int(x.saturating_add(y)),
            (Num::Uint(x), Num::Uint(y)) => Num::Uint(x.saturating_add(y)),
            (x, y) => Num::Float(x.as_f64() + y.as_f64()),
        }
    }

    fn min(a: Num, b: Num) -> Num {
        match Num::promote(a, b) {
            (Num::Int(x), Num::Int(y)) => Num::Int(x.min(y)),
            (Num::Uint(x), Num::Uint(y)) => Num::Uint(x.min(y)),
            (x, y) => Num::Float(x.as_f64().min(y.as_f64())),
        }
    }

    fn max(a: Num, b: Num) -> Num {
        match Num::promote(a, b) {
            (Num::Int(x), Num::Int(y)) => Num::Int(x.max(y)),
            (Num::Uint(x), Num::Uint(y)) => Num::Uint(x.max(y)),
            (x, y) => Num::Float(x.as_f64().max(y.as_f64())),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(v) => Value::int64(v),
            Num::Uint(v) => Value::uint64(v),
            Num::Float(v) => Value::float64(v),
        }
    }
}

fn clamp_u64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Reducer instances
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum State {
    Count(u64),
    Sum(Option<Num>),
    Min(Option<Num>),
    Max(Option<Num>),
    Avg { sum: f64, count: u64 },
    First(Option<Value>),
    Last(Option<Value>),
    CountDistinct(HashSet<Bytes>),
}

impl State {
    fn initial(kind: ReducerKind) -> State {
        match kind {
            ReducerKind::Count => State::Count(0),
            ReducerKind::Sum => State::Sum(None),
            ReducerKind::Min => State::Min(None),
            ReducerKind::Max => State::Max(None),
            ReducerKind::Avg => State::Avg { sum: 0.0, count: 0 },
            ReducerKind::First => State::First(None),
            ReducerKind::Last => State::Last(None),
            ReducerKind::CountDistinct => State::CountDistinct(HashSet::new()),
        }
    }
}

/// One running reducer.
pub struct ReducerInst {
    kind: ReducerKind,
    name: String,
    resolver: Option<SharedResolver>,
    state: State,
}

impl ReducerInst {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feed one record. Total: never fails, whatever the record holds.
    pub fn update(&mut self, record: &Record) {
        let value = match &self.resolver {
            Some(resolver) => match resolver(record) {
                Some(v) if !v.is_null() => Some(v),
                _ => None,
            },
            None => None,
        };
        match &mut self.state {
            State::Count(n) => {
                // Bare count() counts records; count(field) counts non-null
                // values of the field.
                if self.resolver.is_none() || value.is_some() {
                    *n += 1;
                }
            }
            State::Sum(state) => {
                if let Some(num) = value.as_ref().and_then(Num::of) {
                    *state = Some(match *state {
                        None => num,
                        Some(prev) => Num::add(prev, num),
                    });
                }
            }
            State::Min(state) => {
                if let Some(num) = value.as_ref().and_then(Num::of) {
                    *state = Some(match *state {
                        None => num,
                        Some(prev) => Num::min(prev, num),
                    });
                }
            }
            State::Max(state) => {
                if let Some(num) = value.as_ref().and_then(Num::of) {
                    *state = Some(match *state {
                        None => num,
                        Some(prev) => Num::max(prev, num),
                    });
                }
            }
            State::Avg { sum, count } => {
                if let Some(num) = value.as_ref().and_then(Num::of) {
                    *sum += num.as_f64();
                    *count += 1;
                }
            }
            State::First(state) => {
                if state.is_none() {
                    if let Some(v) = value {
                        *state = Some(v);
                    }
                }
            }
            State::Last(state) => {
                if let Some(v) = value {
                    *state = Some(v);
                }
            }
            State::CountDistinct(seen) => {
                if let Some(bytes) = value.and_then(|v| v.bytes) {
                    seen.insert(bytes);
                }
            }
        }
    }

    /// The current result. Callable at any time for provisional emission;
    /// final at end of stream.
    pub fn result(&self) -> Value {
        match &self.state {
            State::Count(n) => Value::uint64(*n),
            State::Sum(state) | State::Min(state) | State::Max(state) => match state {
                Some(num) => num.into_value(),
                None => Value::null(Type::Int64),
            },
            State::Avg { sum, count } => {
                if *count == 0 {
                    Value::null(Type::Float64)
                } else {
                    Value::float64(sum / *count as f64)
                }
            }
            State::First(state) | State::Last(state) => match state {
                Some(v) => v.clone(),
                None => Value::null(Type::Bytes),
            },
            State::CountDistinct(seen) => Value::uint64(seen.len() as u64),
        }
    }
}
