//! Filter Predicate Compilation
//!
//! Compiles a boolean expression tree into a pure predicate
//! `(record) → bool`. The typed comparator for each comparison node is
//! selected once at compile time from a closed table:
//!
//! - numeric family (ints, uints, port, duration): both sides coerce to
//!   128-bit signed or to float depending on how the literal parsed; a
//!   literal that does not fit a column's range is simply false for that
//!   record
//! - time: nanosecond comparison
//! - string / bytes / enum: lexicographic byte comparison; `=~` is substring
//!   match and `!~` its negation
//! - ip: equality against ip literals; prefix containment against net
//!   literals
//! - bool: equality only
//!
//! Any cross-family comparison (time against duration included) is a type
//! mismatch and false. A malformed value payload makes that one comparison
//! null (false) — the record is not dropped by decoding — and is reported
//! through the warning hook at most once per (schema, field) pair.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use loghouse_ast::BooleanExpr;
use loghouse_core::value::{self, ElementIter};
use loghouse_core::{Record, SchemaId, Type, Value};

use crate::error::{ExprError, Result};
use crate::literal::Literal;
use crate::resolver::compile_field_expr;

/// A compiled record predicate.
pub type Filter = Box<dyn Fn(&Record) -> bool + Send + Sync>;

/// Hook for per-record decode warnings discovered during evaluation.
pub type WarnFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Compile a filter that silently degrades decode errors to null.
pub fn compile_filter(expr: &BooleanExpr) -> Result<Filter> {
    compile_filter_with_warnings(expr, Arc::new(|_: &str| {}))
}

/// Compile a filter that reports decode errors through `warn`, at most once
/// per (schema, field) pair.
pub fn compile_filter_with_warnings(expr: &BooleanExpr, warn: WarnFn) -> Result<Filter> {
    match expr {
        BooleanExpr::LogicalAnd { left, right } => {
            let left = compile_filter_with_warnings(left, Arc::clone(&warn))?;
            let right = compile_filter_with_warnings(right, warn)?;
            Ok(Box::new(move |rec| left(rec) && right(rec)))
        }
        BooleanExpr::LogicalOr { left, right } => {
            let left = compile_filter_with_warnings(left, Arc::clone(&warn))?;
            let right = compile_filter_with_warnings(right, warn)?;
            Ok(Box::new(move |rec| left(rec) || right(rec)))
        }
        BooleanExpr::LogicalNot { expr } => {
            let inner = compile_filter_with_warnings(expr, warn)?;
            Ok(Box::new(move |rec| !inner(rec)))
        }
        BooleanExpr::BooleanLiteral { value } => {
            let value = *value;
            Ok(Box::new(move |_| value))
        }
        BooleanExpr::CompareField {
            comparator,
            field,
            value,
        } => {
            let resolver = compile_field_expr(field)?;
            let cmp = Comparator::new(comparator, value)?;
            let label = field_label(field);
            let warned = Mutex::new(HashSet::<(SchemaId, String)>::new());
            Ok(Box::new(move |rec| {
                let v = match resolver(rec) {
                    Some(v) => v,
                    None => return false,
                };
                match cmp.compare(&v) {
                    Ok(matched) => matched,
                    Err(e) => {
                        let key = (rec.schema().id(), label.clone());
                        if warned.lock().expect("warn set").insert(key) {
                            warn(&format!("field {}: {}", label, e));
                        }
                        false
                    }
                }
            }))
        }
        BooleanExpr::CompareAny { comparator, value } => {
            let cmp = Comparator::new(comparator, value)?;
            let warned = Mutex::new(HashSet::<SchemaId>::new());
            Ok(Box::new(move |rec| {
                match any_scalar_matches(rec, &cmp) {
                    Ok(matched) => matched,
                    Err(e) => {
                        if warned.lock().expect("warn set").insert(rec.schema().id()) {
                            warn(&format!("record scan: {}", e));
                        }
                        false
                    }
                }
            }))
        }
        BooleanExpr::SearchString { value } => {
            let needle = match Literal::parse(value)? {
                Literal::Bytes(b) => b,
                _ => {
                    return Err(ExprError::BadLiteral {
                        ty: value.ty.clone(),
                        value: value.value.clone(),
                    })
                }
            };
            Ok(Box::new(move |rec| contains(rec.payload(), &needle)))
        }
    }
}

fn field_label(expr: &loghouse_ast::FieldExpr) -> String {
    match expr {
        loghouse_ast::FieldExpr::FieldRead { field } => field.clone(),
        loghouse_ast::FieldExpr::FieldCall { func, field, .. } => {
            format!("{}({})", func, field)
        }
    }
}

/// Case-sensitive byte substring scan.
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

// ---------------------------------------------------------------------------
// Typed comparators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
}

impl CompareOp {
    fn parse(s: &str) -> Result<CompareOp> {
        match s {
            "=" | "eql" => Ok(CompareOp::Eq),
            "!=" | "neql" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            "=~" => Ok(CompareOp::Match),
            "!~" => Ok(CompareOp::NotMatch),
            other => Err(ExprError::UnknownComparator(other.to_string())),
        }
    }

    fn of_ordering(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
            CompareOp::Match | CompareOp::NotMatch => false,
        }
    }
}

struct Comparator {
    op: CompareOp,
    literal: Literal,
}

impl Comparator {
    fn new(op: &str, tv: &loghouse_ast::TypedValue) -> Result<Comparator> {
        Ok(Comparator {
            op: CompareOp::parse(op)?,
            literal: Literal::parse(tv)?,
        })
    }

    /// Evaluate against one typed value. `Err` means the value's bytes were
    /// malformed for its type; the caller degrades that to null.
    fn compare(&self, v: &Value) -> loghouse_core::Result<bool> {
        let bytes = match v.bytes.as_deref() {
            Some(b) => b,
            None => return Ok(false),
        };
        if v.ty.is_container() {
            return Ok(false);
        }
        match &v.ty {
            ty if ty.is_numeric() => self.compare_numeric(ty, bytes),
            Type::Time => {
                let lhs = value::decode_time(bytes)?;
                match self.literal {
                    Literal::Time(rhs) => Ok(self.op.of_ordering(lhs.cmp(&rhs))),
                    _ => Ok(false),
                }
            }
            Type::String | Type::Bytes | Type::Enum => {
                if matches!(v.ty, Type::String) {
                    // Validates UTF-8; comparison itself is byte-wise.
                    value::decode_string(bytes)?;
                }
                match (&self.literal, self.op) {
                    (Literal::Bytes(rhs), CompareOp::Match) => Ok(contains(bytes, rhs)),
                    (Literal::Bytes(rhs), CompareOp::NotMatch) => Ok(!contains(bytes, rhs)),
                    (Literal::Bytes(rhs), op) => Ok(op.of_ordering(bytes.cmp(rhs.as_ref()))),
                    _ => Ok(false),
                }
            }
            Type::Ip => {
                let lhs = value::ip_to16(value::decode_ip(bytes)?);
                match (&self.literal, self.op) {
                    (Literal::Ip(rhs), CompareOp::Eq) => Ok(lhs == value::ip_to16(*rhs)),
                    (Literal::Ip(rhs), CompareOp::Ne) => Ok(lhs != value::ip_to16(*rhs)),
                    (Literal::Net(addr, prefix), CompareOp::Eq) => {
                        Ok(net_contains(*addr, *prefix, lhs))
                    }
                    (Literal::Net(addr, prefix), CompareOp::Ne) => {
                        Ok(!net_contains(*addr, *prefix, lhs))
                    }
                    _ => Ok(false),
                }
            }
            Type::Net => {
                let (lhs_addr, lhs_prefix) = value::decode_net(bytes)?;
                match (&self.literal, self.op) {
                    (Literal::Net(addr, prefix), CompareOp::Eq) => Ok(
                        value::ip_to16(lhs_addr) == value::ip_to16(*addr)
                            && lhs_prefix == net_prefix_128(*addr, *prefix),
                    ),
                    (Literal::Net(addr, prefix), CompareOp::Ne) => Ok(
                        value::ip_to16(lhs_addr) != value::ip_to16(*addr)
                            || lhs_prefix != net_prefix_128(*addr, *prefix),
                    ),
                    _ => Ok(false),
                }
            }
            Type::Bool => {
                let lhs = value::decode_bool(bytes)?;
                match (&self.literal, self.op) {
                    (Literal::Bool(rhs), CompareOp::Eq) => Ok(lhs == *rhs),
                    (Literal::Bool(rhs), CompareOp::Ne) => Ok(lhs != *rhs),
                    _ => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    fn compare_numeric(&self, ty: &Type, bytes: &[u8]) -> loghouse_core::Result<bool> {
        // Decode the column value into its native family.
        enum Num {
            I(i64),
            U(u64),
            F(f64),
        }
        let lhs = if matches!(ty, Type::Float64) {
            Num::F(value::decode_float64(bytes)?)
        } else if ty.is_signed() {
            Num::I(value::decode_int(bytes)?)
        } else {
            Num::U(value::decode_uint(bytes)?)
        };
        let rhs = match &self.literal {
            Literal::Int(v) => *v,
            Literal::Float(f) => {
                let lhs = match lhs {
                    Num::I(v) => v as f64,
                    Num::U(v) => v as f64,
                    Num::F(v) => v,
                };
                let ord = match lhs.partial_cmp(f) {
                    Some(ord) => ord,
                    None => return Ok(false), // NaN never matches
                };
                return Ok(self.op.of_ordering(ord));
            }
            Literal::Duration(ns) if matches!(ty, Type::Duration) => *ns as i128,
            _ => return Ok(false),
        };
        let ord = match lhs {
            Num::I(v) => (v as i128).cmp(&rhs),
            Num::U(v) => (v as i128).cmp(&rhs),
            Num::F(v) => match v.partial_cmp(&(rhs as f64)) {
                Some(ord) => ord,
                None => return Ok(false),
            },
        };
        Ok(self.op.of_ordering(ord))
    }
}

fn net_prefix_128(addr: std::net::IpAddr, prefix: u8) -> u8 {
    // A v4 prefix widens by 96 bits in the canonical mapped form.
    if addr.is_ipv4() {
        prefix + 96
    } else {
        prefix
    }
}

fn net_contains(addr: std::net::IpAddr, prefix: u8, candidate: [u8; 16]) -> bool {
    let network = value::ip_to16(addr);
    let bits = net_prefix_128(addr, prefix) as usize;
    let full = bits / 8;
    if network[..full] != candidate[..full] {
        return false;
    }
    let rem = bits % 8;
    if rem == 0 {
        return true;
    }
    let mask = 0xFFu8 << (8 - rem);
    (network[full] & mask) == (candidate[full] & mask)
}

// ---------------------------------------------------------------------------
// CompareAny traversal
// ---------------------------------------------------------------------------

fn any_scalar_matches(rec: &Record, cmp: &Comparator) -> loghouse_core::Result<bool> {
    let schema = rec.schema().clone();
    any_in_record(&schema, rec.payload(), cmp)
}

fn any_in_record(
    schema: &loghouse_core::Schema,
    body: &[u8],
    cmp: &Comparator,
) -> loghouse_core::Result<bool> {
    let mut iter = ElementIter::new(body);
    for column in schema.columns() {
        let elem = match iter.next() {
            Some(elem) => elem?,
            None => break,
        };
        let bytes = match elem.bytes {
            Some(b) => b,
            None => continue,
        };
        if any_in_value(&column.ty, bytes, cmp)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn any_in_value(ty: &Type, bytes: &[u8], cmp: &Comparator) -> loghouse_core::Result<bool> {
    match ty {
        Type::Record(schema) => any_in_record(schema, bytes, cmp),
        Type::Set(inner) | Type::Vector(inner) => {
            for elem in ElementIter::new(bytes) {
                let elem = elem?;
                if let Some(b) = elem.bytes {
                    if any_in_value(inner, b, cmp)? {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
        scalar => cmp.compare(&Value::new(
            scalar.clone(),
            Some(bytes::Bytes::copy_from_slice(bytes)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loghouse_ast::{FieldExpr, TypedValue};
    use loghouse_core::{RecordBuilder, Ts, TypeContext};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn rec(ctx: &TypeContext, host: &str, n: i64) -> Record {
        let mut b = RecordBuilder::new();
        b.append_time("ts", Ts(1));
        b.append_string("host", host);
        b.append_int64("n", n);
        b.build(ctx)
    }

    fn compare(op: &str, field: &str, ty: &str, value: &str) -> BooleanExpr {
        BooleanExpr::CompareField {
            comparator: op.to_string(),
            field: FieldExpr::read(field),
            value: TypedValue::new(ty, value),
        }
    }

    #[test]
    fn test_string_equality() {
        let ctx = TypeContext::new();
        let f = compile_filter(&compare("=", "host", "string", "a")).unwrap();
        assert!(f(&rec(&ctx, "a", 1)));
        assert!(!f(&rec(&ctx, "b", 1)));
    }

    #[test]
    fn test_string_substring_match() {
        let ctx = TypeContext::new();
        let f = compile_filter(&compare("=~", "host", "string", "oo")).unwrap();
        assert!(f(&rec(&ctx, "foobar", 1)));
        assert!(!f(&rec(&ctx, "bar", 1)));

        let f = compile_filter(&compare("!~", "host", "string", "oo")).unwrap();
        assert!(!f(&rec(&ctx, "foobar", 1)));
        assert!(f(&rec(&ctx, "bar", 1)));
    }

    #[test]
    fn test_numeric_relations() {
        let ctx = TypeContext::new();
        for (op, n, expect) in [
            ("<", 2i64, true),
            ("<=", 3, true),
            (">", 3, false),
            (">=", 3, true),
            ("=", 3, true),
            ("!=", 3, false),
        ] {
            let f = compile_filter(&compare(op, "n", "int64", "3")).unwrap();
            assert_eq!(f(&rec(&ctx, "a", n)), expect, "op {} n {}", op, n);
        }
    }

    #[test]
    fn test_numeric_literal_against_float_column() {
        let ctx = TypeContext::new();
        let mut b = RecordBuilder::new();
        b.append_float64("x", 2.5);
        let record = b.build(&ctx);
        let f = compile_filter(&compare(">", "x", "int64", "2")).unwrap();
        assert!(f(&record));
    }

    #[test]
    fn test_out_of_range_literal_is_false() {
        let ctx = TypeContext::new();
        // u64::MAX cannot equal any int64 value.
        let f = compile_filter(&compare("=", "n", "uint64", "18446744073709551615")).unwrap();
        assert!(!f(&rec(&ctx, "a", -1)));
    }

    #[test]
    fn test_missing_field_is_false() {
        let ctx = TypeContext::new();
        let f = compile_filter(&compare("=", "nope", "string", "a")).unwrap();
        assert!(!f(&rec(&ctx, "a", 1)));
    }

    #[test]
    fn test_time_vs_duration_is_mismatch() {
        let ctx = TypeContext::new();
        let f = compile_filter(&compare("=", "ts", "duration", "0.000000001")).unwrap();
        assert!(!f(&rec(&ctx, "a", 1))); // ts is 1ns but duration never matches time
    }

    #[test]
    fn test_time_comparison() {
        let ctx = TypeContext::new();
        let mut b = RecordBuilder::new();
        b.append_time("ts", Ts(2_000_000_000));
        let record = b.build(&ctx);
        let f = compile_filter(&compare(">", "ts", "time", "1.5")).unwrap();
        assert!(f(&record));
    }

    #[test]
    fn test_ip_equality_and_prefix_containment() {
        let ctx = TypeContext::new();
        let mut b = RecordBuilder::new();
        b.append(
            "addr",
            &Value::ip("10.1.2.3".parse().unwrap()),
        );
        let record = b.build(&ctx);

        let f = compile_filter(&compare("=", "addr", "ip", "10.1.2.3")).unwrap();
        assert!(f(&record));

        let f = compile_filter(&compare("=", "addr", "net", "10.0.0.0/8")).unwrap();
        assert!(f(&record));

        let f = compile_filter(&compare("=", "addr", "net", "192.168.0.0/16")).unwrap();
        assert!(!f(&record));

        // Relational operators are not defined for addresses.
        let f = compile_filter(&compare("<", "addr", "ip", "10.1.2.4")).unwrap();
        assert!(!f(&record));
    }

    #[test]
    fn test_bool_equality_only() {
        let ctx = TypeContext::new();
        let mut b = RecordBuilder::new();
        b.append_bool("ok", true);
        let record = b.build(&ctx);
        assert!(compile_filter(&compare("=", "ok", "bool", "true")).unwrap()(&record));
        assert!(!compile_filter(&compare("<", "ok", "bool", "true")).unwrap()(&record));
    }

    #[test]
    fn test_logical_connectives() {
        let ctx = TypeContext::new();
        let expr = BooleanExpr::LogicalAnd {
            left: Box::new(compare("=", "host", "string", "a")),
            right: Box::new(BooleanExpr::LogicalNot {
                expr: Box::new(compare("=", "n", "int64", "9")),
            }),
        };
        let f = compile_filter(&expr).unwrap();
        assert!(f(&rec(&ctx, "a", 1)));
        assert!(!f(&rec(&ctx, "a", 9)));
        assert!(!f(&rec(&ctx, "b", 1)));
    }

    #[test]
    fn test_boolean_literal() {
        let ctx = TypeContext::new();
        let t = compile_filter(&BooleanExpr::BooleanLiteral { value: true }).unwrap();
        let f = compile_filter(&BooleanExpr::BooleanLiteral { value: false }).unwrap();
        assert!(t(&rec(&ctx, "a", 1)));
        assert!(!f(&rec(&ctx, "a", 1)));
    }

    #[test]
    fn test_compare_any_hits_any_column() {
        let ctx = TypeContext::new();
        let expr = BooleanExpr::CompareAny {
            comparator: "=".to_string(),
            value: TypedValue::new("int64", "3"),
        };
        let f = compile_filter(&expr).unwrap();
        assert!(f(&rec(&ctx, "a", 3)));
        assert!(!f(&rec(&ctx, "a", 4)));
    }

    #[test]
    fn test_compare_any_recurses_into_nested_record() {
        let ctx = TypeContext::new();
        let inner = {
            let mut b = RecordBuilder::new();
            b.append_int64("depth", 42);
            b.build(&ctx)
        };
        let mut b = RecordBuilder::new();
        b.append_string("host", "a");
        b.append_encoded(
            loghouse_core::Column::new("id", Type::Record(inner.schema().clone())),
            Some(inner.payload()),
        );
        let record = b.build(&ctx);

        let expr = BooleanExpr::CompareAny {
            comparator: "=".to_string(),
            value: TypedValue::new("int64", "42"),
        };
        assert!(compile_filter(&expr).unwrap()(&record));
    }

    #[test]
    fn test_search_string_scans_payload() {
        let ctx = TypeContext::new();
        let expr = BooleanExpr::SearchString {
            value: TypedValue::new("string", "oba"),
        };
        let f = compile_filter(&expr).unwrap();
        assert!(f(&rec(&ctx, "foobar", 1)));
        assert!(!f(&rec(&ctx, "Foobar".to_uppercase().as_str(), 1))); // case-sensitive
    }

    #[test]
    fn test_decode_error_warns_once_per_schema_field() {
        let ctx = TypeContext::new();
        let good = {
            let mut b = RecordBuilder::new();
            b.append_float64("x", 1.0);
            b.build(&ctx)
        };
        // Same schema, corrupt float body (wrong length).
        let bad = Record::new(
            good.schema().clone(),
            {
                let mut buf = bytes::BytesMut::new();
                loghouse_core::value::append_element(&mut buf, Some(&[1, 2, 3]), false);
                buf.freeze()
            },
        );

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let warn: WarnFn = Arc::new(move |_| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });
        let f = compile_filter_with_warnings(&compare("=", "x", "float64", "1"), warn).unwrap();

        assert!(!f(&bad));
        assert!(!f(&bad)); // second hit must not warn again
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
        assert!(f(&good)); // healthy record still matches
    }

    #[test]
    fn test_unknown_comparator_is_compile_error() {
        let err = match compile_filter(&compare("<>", "n", "int64", "1")) {
            Err(e) => e,
            Ok(_) => panic!("expected compile error"),
        };
        assert!(matches!(err, ExprError::UnknownComparator(_)));
    }
}
