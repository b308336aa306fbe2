//! Typed Literal Parsing
//!
//! A [`TypedValue`](loghouse_ast::TypedValue) carries a type name and a
//! string rendering of the value. Parsing happens once, at expression
//! compile time; a literal that does not conform to its declared type is a
//! compile error, not a per-record condition.
//!
//! Numeric literals keep their full precision as `i128` so that a literal
//! can later be range-checked against whichever numeric column it meets.
//! String literals are kept as raw bytes: comparisons are byte-wise, and a
//! byte-string can represent values that are not valid UTF-8.

use std::net::IpAddr;

use bytes::Bytes;
use loghouse_ast::TypedValue;
use loghouse_core::Ts;

use crate::error::{ExprError, Result};

/// A literal parsed into its native comparison form.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    /// Any integer-family literal (int, uint, port), kept wide.
    Int(i128),
    Float(f64),
    /// string / bytes / enum literals; compared byte-wise.
    Bytes(Bytes),
    Ip(IpAddr),
    Net(IpAddr, u8),
    Time(Ts),
    /// Nanoseconds.
    Duration(i64),
}

impl Literal {
    /// Parse a typed value per its declared type name.
    pub fn parse(tv: &TypedValue) -> Result<Literal> {
        let bad = || ExprError::BadLiteral {
            ty: tv.ty.clone(),
            value: tv.value.clone(),
        };
        match tv.ty.as_str() {
            "bool" => match tv.value.as_str() {
                "true" => Ok(Literal::Bool(true)),
                "false" => Ok(Literal::Bool(false)),
                _ => Err(bad()),
            },
            "int16" | "int32" | "int64" | "uint16" | "uint32" | "uint64" | "port" => {
                parse_numeric(&tv.value).ok_or_else(bad)
            }
            "float64" => tv.value.parse::<f64>().map(Literal::Float).map_err(|_| bad()),
            "string" | "bytes" | "enum" => Ok(Literal::Bytes(Bytes::copy_from_slice(
                tv.value.as_bytes(),
            ))),
            "ip" => tv.value.parse::<IpAddr>().map(Literal::Ip).map_err(|_| bad()),
            "net" => {
                let (addr, prefix) = tv.value.split_once('/').ok_or_else(bad)?;
                let addr: IpAddr = addr.parse().map_err(|_| bad())?;
                let prefix: u8 = prefix.parse().map_err(|_| bad())?;
                let max = if addr.is_ipv4() { 32 } else { 128 };
                if prefix > max {
                    return Err(bad());
                }
                Ok(Literal::Net(addr, prefix))
            }
            "time" => parse_seconds(&tv.value).map(Ts).map(Literal::Time).ok_or_else(bad),
            "duration" => parse_seconds(&tv.value).map(Literal::Duration).ok_or_else(bad),
            _ => Err(bad()),
        }
    }
}

/// Integer if it parses as one, float otherwise.
fn parse_numeric(s: &str) -> Option<Literal> {
    if let Ok(v) = s.parse::<i128>() {
        return Some(Literal::Int(v));
    }
    s.parse::<f64>().ok().map(Literal::Float)
}

/// Decimal seconds (fractional allowed) to nanoseconds.
fn parse_seconds(s: &str) -> Option<i64> {
    let secs: f64 = s.parse().ok()?;
    let nanos = secs * 1e9;
    if !nanos.is_finite() || nanos >= i64::MAX as f64 || nanos <= i64::MIN as f64 {
        return None;
    }
    Some(nanos.round() as i64)
}
