//! Query AST
//!
//! The declarative form of a LogHouse query: a tree of processor nodes
//! ([`Proc`]) whose filters are boolean expression trees ([`BooleanExpr`])
//! over field expressions ([`FieldExpr`]). The textual parser (a separate
//! component) produces this tree; the exec crate compiles it into a running
//! proc graph.
//!
//! Every enum here is a closed set, serialized as an internally-tagged JSON
//! object keyed by `"op"`, which is the wire form clients POST to the
//! service front-end:
//!
//! ```json
//! {"op": "SequentialProc", "procs": [
//!     {"op": "FilterProc", "filter": {"op": "CompareField",
//!         "comparator": "=",
//!         "field": {"op": "FieldRead", "field": "host"},
//!         "value": {"type": "string", "value": "a"}}},
//!     {"op": "HeadProc", "count": 2}
//! ]}
//! ```
//!
//! Durations and update intervals are signed 64-bit nanosecond counts.

use serde::{Deserialize, Serialize};

/// A literal value tagged with its type name, e.g. `{"type": "int64",
/// "value": "3"}`. The value string must conform to the named type; the
/// expression compiler parses it once at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    #[serde(rename = "type")]
    pub ty: String,
    pub value: String,
}

impl TypedValue {
    pub fn new(ty: impl Into<String>, value: impl Into<String>) -> Self {
        TypedValue {
            ty: ty.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field expressions
// ---------------------------------------------------------------------------

/// An expression that reads a value out of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum FieldExpr {
    /// A direct reference to a field. Dotted names (`id.orig_h`) descend
    /// into nested records.
    FieldRead { field: String },
    /// An operation on the value of a field: `len(some_set)` or
    /// `some_vector[1]`. `fn` is one of the closed set `"len"` / `"index"`;
    /// `param` carries the index for `"index"`.
    FieldCall {
        #[serde(rename = "fn")]
        func: String,
        field: String,
        #[serde(default)]
        param: String,
    },
}

impl FieldExpr {
    pub fn read(field: impl Into<String>) -> Self {
        FieldExpr::FieldRead {
            field: field.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Boolean expressions (search expressions / filters)
// ---------------------------------------------------------------------------

/// A filter predicate tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum BooleanExpr {
    LogicalAnd {
        left: Box<BooleanExpr>,
        right: Box<BooleanExpr>,
    },
    LogicalOr {
        left: Box<BooleanExpr>,
        right: Box<BooleanExpr>,
    },
    LogicalNot {
        expr: Box<BooleanExpr>,
    },
    BooleanLiteral {
        value: bool,
    },
    /// Compare the literal against every scalar field of the record,
    /// recursing into containers; true iff any field matches.
    CompareAny {
        comparator: String,
        value: TypedValue,
    },
    /// Compare the literal against one field expression.
    CompareField {
        comparator: String,
        field: FieldExpr,
        value: TypedValue,
    },
    /// Case-sensitive substring scan of the raw record payload.
    SearchString {
        value: TypedValue,
    },
}

// ---------------------------------------------------------------------------
// Reducers
// ---------------------------------------------------------------------------

/// One reducer in a `ReducerProc` or `GroupByProc`. `op` names the reducer
/// kind (`count`, `sum`, `min`, `max`, `avg`, `first`, `last`,
/// `countdistinct`); the result lands in the output record under `var`, or
/// under the kind name when `var` is empty. `field` is the input column;
/// only `count` may omit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reducer {
    pub op: String,
    #[serde(default)]
    pub var: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl Reducer {
    pub fn new(op: impl Into<String>, field: Option<&str>) -> Self {
        Reducer {
            op: op.into(),
            var: String::new(),
            field: field.map(str::to_string),
        }
    }
}

// ---------------------------------------------------------------------------
// Procs
// ---------------------------------------------------------------------------

fn default_sort_dir() -> i32 {
    1
}

/// A node in the query flowgraph: takes records in, processes them, and
/// produces records as output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Proc {
    /// A chain: each proc consumes the previous proc's output.
    SequentialProc { procs: Vec<Proc> },
    /// A fan-out: every child consumes a copy of the parent's stream.
    ParallelProc { procs: Vec<Proc> },
    /// Stable sort with bounded memory. `limit` 0 means the runtime default.
    /// `sortdir` is +1 ascending, -1 descending, applied to all fields.
    SortProc {
        fields: Vec<FieldExpr>,
        #[serde(default)]
        limit: u64,
        #[serde(default = "default_sort_dir")]
        sortdir: i32,
    },
    /// Project to the named fields, in the given order.
    CutProc { fields: Vec<String> },
    /// Forward at most `count` records, then end and cancel upstream.
    HeadProc { count: u64 },
    /// Buffer everything, emit the final `count` records.
    TailProc { count: u64 },
    /// Keep only records matching the filter.
    FilterProc { filter: BooleanExpr },
    /// Mirror the input.
    PassProc,
    /// Drop records whose payload equals the previous record's. With
    /// `cflag`, append a `count: uint64` column per run.
    UniqProc {
        #[serde(default)]
        cflag: bool,
    },
    /// Partial sort: the top `limit` records by the sort ordering.
    TopProc {
        fields: Vec<FieldExpr>,
        limit: u64,
    },
    /// Consume everything, emit one record of reducer results.
    /// `update_interval` > 0 additionally emits provisional results at that
    /// wall-clock cadence (nanoseconds).
    ReducerProc {
        reducers: Vec<Reducer>,
        #[serde(default)]
        update_interval: i64,
    },
    /// Partition by key fields (optionally time-binned by `duration`
    /// nanoseconds) and apply reducers per group. `limit` 0 means the
    /// runtime default group cardinality bound.
    GroupByProc {
        keys: Vec<String>,
        reducers: Vec<Reducer>,
        #[serde(default)]
        duration: i64,
        #[serde(default)]
        update_interval: i64,
        #[serde(default)]
        limit: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_host_eq_a() -> BooleanExpr {
        BooleanExpr::CompareField {
            comparator: "=".to_string(),
            field: FieldExpr::read("host"),
            value: TypedValue::new("string", "a"),
        }
    }

    #[test]
    fn test_wire_form_uses_op_tags() {
        let proc = Proc::SequentialProc {
            procs: vec![
                Proc::FilterProc {
                    filter: filter_host_eq_a(),
                },
                Proc::HeadProc { count: 2 },
            ],
        };
        let json = serde_json::to_value(&proc).unwrap();
        assert_eq!(json["op"], "SequentialProc");
        assert_eq!(json["procs"][0]["op"], "FilterProc");
        assert_eq!(json["procs"][0]["filter"]["op"], "CompareField");
        assert_eq!(json["procs"][0]["filter"]["value"]["type"], "string");
        assert_eq!(json["procs"][1]["op"], "HeadProc");
    }

    #[test]
    fn test_roundtrip() {
        let proc = Proc::GroupByProc {
            keys: vec!["host".to_string()],
            reducers: vec![Reducer::new("sum", Some("n"))],
            duration: 10,
            update_interval: 0,
            limit: 0,
        };
        let json = serde_json::to_string(&proc).unwrap();
        let back: Proc = serde_json::from_str(&json).unwrap();
        assert_eq!(proc, back);
    }

    #[test]
    fn test_defaults_on_deserialize() {
        let proc: Proc = serde_json::from_str(
            r#"{"op":"SortProc","fields":[{"op":"FieldRead","field":"n"}]}"#,
        )
        .unwrap();
        match proc {
            Proc::SortProc {
                limit, sortdir, ..
            } => {
                assert_eq!(limit, 0);
                assert_eq!(sortdir, 1);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_uniq_cflag_default() {
        let proc: Proc = serde_json::from_str(r#"{"op":"UniqProc"}"#).unwrap();
        assert_eq!(proc, Proc::UniqProc { cflag: false });
    }

    #[test]
    fn test_field_call_wire_form() {
        let expr: FieldExpr = serde_json::from_str(
            r#"{"op":"FieldCall","fn":"len","field":"addrs"}"#,
        )
        .unwrap();
        match expr {
            FieldExpr::FieldCall { func, field, param } => {
                assert_eq!(func, "len");
                assert_eq!(field, "addrs");
                assert!(param.is_empty());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_boolean_tree_roundtrip() {
        let expr = BooleanExpr::LogicalAnd {
            left: Box::new(filter_host_eq_a()),
            right: Box::new(BooleanExpr::LogicalNot {
                expr: Box::new(BooleanExpr::SearchString {
                    value: TypedValue::new("string", "needle"),
                }),
            }),
        };
        let json = serde_json::to_string(&expr).unwrap();
        let back: BooleanExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }
}
