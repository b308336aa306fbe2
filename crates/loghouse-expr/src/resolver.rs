//! Field Resolvers
//!
//! Compiles a field-path expression into a pure accessor
//! `(record) → value`. A resolver returns `None` for anything that does not
//! resolve — a missing field, a missing intermediate record in a dotted
//! path, a type mismatch for the operation — so downstream comparison and
//! sorting treat all of those as null, per the engine's error policy.
//!
//! The recognized call set is closed: a bare field read (dotted names
//! descend nested records), `len(x)` on a container, and `x[i]` on a
//! vector.

use loghouse_ast::FieldExpr;
use loghouse_core::value::ElementIter;
use loghouse_core::{Record, Type, Value};

use crate::error::{ExprError, Result};

/// A compiled field accessor. `None` means the field did not resolve.
pub type Resolver = Box<dyn Fn(&Record) -> Option<Value> + Send + Sync>;

/// Compile any field expression.
pub fn compile_field_expr(expr: &FieldExpr) -> Result<Resolver> {
    match expr {
        FieldExpr::FieldRead { field } => Ok(compile_field_path(field)),
        FieldExpr::FieldCall { func, field, param } => match func.as_str() {
            "len" => {
                let read = compile_field_path(field);
                Ok(Box::new(move |rec| {
                    let v = read(rec)?;
                    let bytes = v.bytes.as_deref()?;
                    match v.ty {
                        Type::Set(_) | Type::Vector(_) => {
                            let mut count: u64 = 0;
                            for elem in ElementIter::new(bytes) {
                                elem.ok()?;
                                count += 1;
                            }
                            Some(Value::uint64(count))
                        }
                        _ => None,
                    }
                }))
            }
            "index" => {
                let index: usize = param
                    .parse()
                    .map_err(|_| ExprError::BadIndex(param.clone()))?;
                let read = compile_field_path(field);
                Ok(Box::new(move |rec| {
                    let v = read(rec)?;
                    let bytes = v.bytes.as_deref()?;
                    let inner = match &v.ty {
                        Type::Vector(inner) => inner.as_ref().clone(),
                        _ => return None,
                    };
                    let elem = ElementIter::new(bytes).nth(index)?.ok()?;
                    Some(Value::new(
                        inner,
                        elem.bytes.map(|b| bytes::Bytes::copy_from_slice(b)),
                    ))
                }))
            }
            other => Err(ExprError::UnknownFunction(other.to_string())),
        },
    }
}

/// Compile a dotted field path into an accessor.
pub fn compile_field_path(path: &str) -> Resolver {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    Box::new(move |rec| resolve_path(rec, &segments))
}

fn resolve_path(rec: &Record, segments: &[String]) -> Option<Value> {
    let mut value = rec.value_by_name(&segments[0])?.ok()?;
    for segment in &segments[1..] {
        let schema = match &value.ty {
            Type::Record(schema) => schema.clone(),
            _ => return None,
        };
        let body = value.bytes?;
        let index = schema.column_index(segment)?;
        let column = schema.column(index)?.clone();
        let elem = ElementIter::new(&body).nth(index)?.ok()?;
        value = Value::new(
            column.ty,
            elem.bytes.map(|b| body.slice_ref(b)),
        );
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use loghouse_core::value::{append_element, decode_int, decode_uint, encode_int};
    use loghouse_core::{Column, RecordBuilder, TypeContext};

    fn vector_record(ctx: &TypeContext, elems: &[i64]) -> Record {
        let mut body = BytesMut::new();
        for &e in elems {
            append_element(&mut body, Some(&encode_int(e)), false);
        }
        let mut b = RecordBuilder::new();
        b.append_encoded(
            Column::new("xs", Type::Vector(Box::new(Type::Int64))),
            Some(&body),
        );
        b.build(ctx)
    }

    #[test]
    fn test_bare_read() {
        let ctx = TypeContext::new();
        let mut b = RecordBuilder::new();
        b.append_int64("n", 7);
        let rec = b.build(&ctx);

        let resolver = compile_field_expr(&FieldExpr::read("n")).unwrap();
        let v = resolver(&rec).unwrap();
        assert_eq!(decode_int(v.bytes.as_deref().unwrap()).unwrap(), 7);
    }

    #[test]
    fn test_missing_field_is_none() {
        let ctx = TypeContext::new();
        let mut b = RecordBuilder::new();
        b.append_int64("n", 7);
        let rec = b.build(&ctx);

        let resolver = compile_field_path("missing");
        assert!(resolver(&rec).is_none());
    }

    #[test]
    fn test_dotted_path_descends() {
        let ctx = TypeContext::new();
        let inner = {
            let mut b = RecordBuilder::new();
            b.append_string("orig_h", "10.0.0.1");
            b.build(&ctx)
        };
        let mut b = RecordBuilder::new();
        b.append_encoded(
            Column::new("id", Type::Record(inner.schema().clone())),
            Some(inner.payload()),
        );
        let rec = b.build(&ctx);

        let resolver = compile_field_path("id.orig_h");
        let v = resolver(&rec).unwrap();
        assert_eq!(v.bytes.as_deref(), Some(&b"10.0.0.1"[..]));
    }

    #[test]
    fn test_dotted_path_missing_intermediate() {
        let ctx = TypeContext::new();
        let mut b = RecordBuilder::new();
        b.append_string("id", "not-a-record");
        let rec = b.build(&ctx);

        // `id` exists but is not a record, so descent fails to null.
        assert!(compile_field_path("id.orig_h")(&rec).is_none());
    }

    #[test]
    fn test_len_of_vector() {
        let ctx = TypeContext::new();
        let rec = vector_record(&ctx, &[1, 2, 3]);
        let resolver = compile_field_expr(&FieldExpr::FieldCall {
            func: "len".to_string(),
            field: "xs".to_string(),
            param: String::new(),
        })
        .unwrap();
        let v = resolver(&rec).unwrap();
        assert_eq!(v.ty, Type::Uint64);
        assert_eq!(decode_uint(v.bytes.as_deref().unwrap()).unwrap(), 3);
    }

    #[test]
    fn test_len_of_scalar_is_none() {
        let ctx = TypeContext::new();
        let mut b = RecordBuilder::new();
        b.append_int64("n", 1);
        let rec = b.build(&ctx);
        let resolver = compile_field_expr(&FieldExpr::FieldCall {
            func: "len".to_string(),
            field: "n".to_string(),
            param: String::new(),
        })
        .unwrap();
        assert!(resolver(&rec).is_none());
    }

    #[test]
    fn test_index_into_vector() {
        let ctx = TypeContext::new();
        let rec = vector_record(&ctx, &[10, 20, 30]);
        let resolver = compile_field_expr(&FieldExpr::FieldCall {
            func: "index".to_string(),
            field: "xs".to_string(),
            param: "1".to_string(),
        })
        .unwrap();
        let v = resolver(&rec).unwrap();
        assert_eq!(v.ty, Type::Int64);
        assert_eq!(decode_int(v.bytes.as_deref().unwrap()).unwrap(), 20);
    }

    #[test]
    fn test_index_out_of_bounds_is_none() {
        let ctx = TypeContext::new();
        let rec = vector_record(&ctx, &[10]);
        let resolver = compile_field_expr(&FieldExpr::FieldCall {
            func: "index".to_string(),
            field: "xs".to_string(),
            param: "5".to_string(),
        })
        .unwrap();
        assert!(resolver(&rec).is_none());
    }

    #[test]
    fn test_unknown_function_is_compile_error() {
        let err = match compile_field_expr(&FieldExpr::FieldCall {
            func: "sqrt".to_string(),
            field: "n".to_string(),
            param: String::new(),
        }) {
            Err(e) => e,
            Ok(_) => panic!("expected compile error"),
        };
        assert!(matches!(err, ExprError::UnknownFunction(_)));
    }

    #[test]
    fn test_bad_index_param_is_compile_error() {
        let err = match compile_field_expr(&FieldExpr::FieldCall {
            func: "index".to_string(),
            field: "xs".to_string(),
            param: "not-a-number".to_string(),
        }) {
            Err(e) => e,
            Ok(_) => panic!("expected compile error"),
        };
        assert!(matches!(err, ExprError::BadIndex(_)));
    }
}
