//! Type Context: Schema Interning
//!
//! A [`TypeContext`] interns ordered column lists so that two schemas with
//! identical columns share one identity (the same `Arc<Schema>` and
//! [`SchemaId`]). Every record emitted by a query stage must carry a schema
//! interned in the query's local context.
//!
//! ## Scope
//! One context per query: created when the query starts, dropped when it
//! ends. It is never a process-wide singleton; schema ids are only
//! meaningful relative to their context.
//!
//! ## Concurrency
//! Interning takes the single writer lock; lookups of already-interned
//! schemas take the shared read path. Critical sections never block on I/O,
//! so the lock is a plain `std::sync::RwLock` even though callers are async.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::schema::{Column, Schema, SchemaId};
use crate::types::Type;

#[derive(Default)]
struct Inner {
    table: HashMap<Vec<Column>, Arc<Schema>>,
    schemas: Vec<Arc<Schema>>,
}

/// Interns (ordered column list) → schema identity.
#[derive(Default)]
pub struct TypeContext {
    inner: RwLock<Inner>,
}

impl TypeContext {
    pub fn new() -> Self {
        TypeContext::default()
    }

    /// Look up the schema for a column list, interning it on first sight.
    pub fn lookup_record_type(&self, columns: &[Column]) -> Arc<Schema> {
        {
            let inner = self.inner.read().expect("type context lock poisoned");
            if let Some(schema) = inner.table.get(columns) {
                return Arc::clone(schema);
            }
        }
        let mut inner = self.inner.write().expect("type context lock poisoned");
        // Another writer may have interned it between the two lock scopes.
        if let Some(schema) = inner.table.get(columns) {
            return Arc::clone(schema);
        }
        let id = inner.schemas.len() as SchemaId;
        let schema = Arc::new(Schema::new(id, columns.to_vec()));
        inner.table.insert(columns.to_vec(), Arc::clone(&schema));
        inner.schemas.push(Arc::clone(&schema));
        schema
    }

    /// The schema previously interned under `id`, if any.
    pub fn schema(&self, id: SchemaId) -> Option<Arc<Schema>> {
        let inner = self.inner.read().expect("type context lock poisoned");
        inner.schemas.get(id as usize).cloned()
    }

    /// Number of interned schemas.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("type context lock poisoned")
            .schemas
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Translate a schema from a foreign context into this one, interning
    /// locally on demand. Nested record columns are translated bottom-up so
    /// that inner schema identities are local too.
    pub fn translate(&self, foreign: &Schema) -> Arc<Schema> {
        let columns: Vec<Column> = foreign
            .columns()
            .iter()
            .map(|col| Column::new(col.name.clone(), self.translate_type(&col.ty)))
            .collect();
        self.lookup_record_type(&columns)
    }

    fn translate_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Set(inner) => Type::Set(Box::new(self.translate_type(inner))),
            Type::Vector(inner) => Type::Vector(Box::new(self.translate_type(inner))),
            Type::Record(schema) => Type::Record(self.translate(schema)),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("ts", Type::Time),
            Column::new("host", Type::String),
        ]
    }

    #[test]
    fn test_interning_shares_identity() {
        let ctx = TypeContext::new();
        let a = ctx.lookup_record_type(&columns());
        let b = ctx.lookup_record_type(&columns());
        assert!(Schema::same(&a, &b));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_distinct_columns_distinct_ids() {
        let ctx = TypeContext::new();
        let a = ctx.lookup_record_type(&columns());
        let b = ctx.lookup_record_type(&[Column::new("n", Type::Int64)]);
        assert_ne!(a.id(), b.id());
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_column_order_matters() {
        let ctx = TypeContext::new();
        let mut reversed = columns();
        reversed.reverse();
        let a = ctx.lookup_record_type(&columns());
        let b = ctx.lookup_record_type(&reversed);
        assert!(!Schema::same(&a, &b));
    }

    #[test]
    fn test_schema_by_id() {
        let ctx = TypeContext::new();
        let a = ctx.lookup_record_type(&columns());
        let found = ctx.schema(a.id()).unwrap();
        assert!(Schema::same(&a, &found));
        assert!(ctx.schema(99).is_none());
    }

    #[test]
    fn test_translate_foreign_schema() {
        let remote = TypeContext::new();
        let local = TypeContext::new();

        // Give the remote context an extra schema first so the ids diverge.
        remote.lookup_record_type(&[Column::new("x", Type::Bool)]);
        let foreign = remote.lookup_record_type(&columns());
        assert_eq!(foreign.id(), 1);

        let translated = local.translate(&foreign);
        assert_eq!(translated.id(), 0);
        assert_eq!(translated.columns(), foreign.columns());

        // Translating again must not intern a duplicate.
        let again = local.translate(&foreign);
        assert!(Schema::same(&translated, &again));
    }

    #[test]
    fn test_translate_nested_record() {
        let remote = TypeContext::new();
        let inner = remote.lookup_record_type(&[Column::new("a", Type::Int64)]);
        let outer = remote.lookup_record_type(&[
            Column::new("nested", Type::Record(inner)),
            Column::new("b", Type::String),
        ]);

        let local = TypeContext::new();
        let translated = local.translate(&outer);
        let nested = translated.columns()[0]
            .ty
            .record_schema()
            .expect("nested record");
        // The nested schema is now interned locally.
        assert!(Schema::same(nested, &local.schema(nested.id()).unwrap()));
        assert_eq!(local.len(), 2);
    }

    #[test]
    fn test_concurrent_interning() {
        let ctx = Arc::new(TypeContext::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ctx = Arc::clone(&ctx);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    ctx.lookup_record_type(&[Column::new("n", Type::Int64)]);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ctx.len(), 1);
    }
}
