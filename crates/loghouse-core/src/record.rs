//! Records
//!
//! A [`Record`] is a pair of schema identity and packed byte payload. The
//! payload is the framed element sequence of the record's columns (see the
//! [`value`](crate::value) module); it is immutable after construction.
//! Stages that change shape (cut, the aggregators) build *new* records with
//! possibly new schemas via [`RecordBuilder`].
//!
//! Column access slices the shared payload without copying.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::nano::Ts;
use crate::schema::{Column, Schema};
use crate::types::Type;
use crate::value::{self, ElementIter, Value};
use crate::TypeContext;

/// An immutable event: interned schema plus packed payload.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    payload: Bytes,
}

impl Record {
    pub fn new(schema: Arc<Schema>, payload: Bytes) -> Self {
        Record { schema, payload }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The raw framed payload. Full-text search scans this directly.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Iterate the record's column elements without copying.
    pub fn elements(&self) -> ElementIter<'_> {
        ElementIter::new(&self.payload)
    }

    /// The value of the column at `index`. Returns a null value of the
    /// column's type when the payload holds fewer elements than the schema
    /// (absent trailing columns), and a decode error on malformed framing.
    pub fn column_value(&self, index: usize) -> Result<Value> {
        let column = self
            .schema
            .column(index)
            .ok_or_else(|| Error::NoSuchColumn(format!("#{}", index)))?;
        let mut iter = self.elements();
        for _ in 0..index {
            match iter.next() {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => return Ok(Value::null(column.ty.clone())),
            }
        }
        match iter.next() {
            Some(Ok(elem)) => {
                let bytes = elem.bytes.map(|b| self.payload.slice_ref(b));
                Ok(Value::new(column.ty.clone(), bytes))
            }
            Some(Err(e)) => Err(e),
            None => Ok(Value::null(column.ty.clone())),
        }
    }

    /// The value of a top-level column by name; `None` if the schema has no
    /// such column.
    pub fn value_by_name(&self, name: &str) -> Option<Result<Value>> {
        let index = self.schema.column_index(name)?;
        Some(self.column_value(index))
    }

    /// The designated timestamp, if the record has a `ts` column of time
    /// type holding a decodable, non-null value.
    pub fn ts(&self) -> Option<Ts> {
        let index = self.schema.column_index("ts")?;
        if self.schema.column(index)?.ty != Type::Time {
            return None;
        }
        match self.column_value(index) {
            Ok(v) => v.bytes.as_deref().and_then(|b| value::decode_time(b).ok()),
            Err(_) => None,
        }
    }
}

/// Builds a record column by column, interning the resulting schema.
///
/// ```ignore
/// let mut b = RecordBuilder::new();
/// b.append_time("ts", Ts(1));
/// b.append_string("host", "a");
/// b.append_int64("n", 3);
/// let record = b.build(&ctx);
/// ```
#[derive(Default)]
pub struct RecordBuilder {
    columns: Vec<Column>,
    buf: BytesMut,
}

impl RecordBuilder {
    pub fn new() -> Self {
        RecordBuilder::default()
    }

    /// Append a typed value as the next column.
    pub fn append(&mut self, name: impl Into<String>, value: &Value) {
        let container = value.ty.is_container();
        value::append_element(&mut self.buf, value.bytes.as_deref(), container);
        self.columns.push(Column::new(name, value.ty.clone()));
    }

    /// Append an already-encoded element as the next column.
    pub fn append_encoded(&mut self, column: Column, bytes: Option<&[u8]>) {
        value::append_element(&mut self.buf, bytes, column.ty.is_container());
        self.columns.push(column);
    }

    pub fn append_null(&mut self, name: impl Into<String>, ty: Type) {
        self.append(name, &Value::null(ty));
    }

    pub fn append_bool(&mut self, name: impl Into<String>, v: bool) {
        self.append(name, &Value::from_bool(v));
    }

    pub fn append_int64(&mut self, name: impl Into<String>, v: i64) {
        self.append(name, &Value::int64(v));
    }

    pub fn append_uint64(&mut self, name: impl Into<String>, v: u64) {
        self.append(name, &Value::uint64(v));
    }

    pub fn append_float64(&mut self, name: impl Into<String>, v: f64) {
        self.append(name, &Value::float64(v));
    }

    pub fn append_string(&mut self, name: impl Into<String>, v: impl AsRef<str>) {
        self.append(name, &Value::string(v));
    }

    pub fn append_time(&mut self, name: impl Into<String>, ts: Ts) {
        self.append(name, &Value::time(ts));
    }

    pub fn append_duration(&mut self, name: impl Into<String>, ns: i64) {
        self.append(name, &Value::duration(ns));
    }

    /// Intern the accumulated columns in `ctx` and produce the record.
    pub fn build(self, ctx: &TypeContext) -> Record {
        let schema = ctx.lookup_record_type(&self.columns);
        Record::new(schema, self.buf.freeze())
    }

    /// The packed payload alone, for callers that already hold an interned
    /// schema matching the appended columns.
    pub fn into_payload(self) -> Bytes {
        self.buf.freeze()
    }
}
