//! Mapper: Foreign Schema Translation
//!
//! Records produced under another type context carry schema identities that
//! mean nothing locally; using them unmapped would collide silently with
//! local ids. The mapper wraps a reader and rewrites every record's schema
//! into the query's local context, interning on first sight per foreign
//! schema and caching the mapping after that.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use loghouse_core::{Record, Schema, SchemaId, TypeContext};

use crate::error::Result;
use crate::io::Reader;

/// A reader adapter that localizes schema identities.
pub struct Mapper {
    reader: Box<dyn Reader>,
    local: Arc<TypeContext>,
    /// foreign schema id -> local schema
    cache: HashMap<SchemaId, Arc<Schema>>,
}

impl Mapper {
    pub fn new(reader: Box<dyn Reader>, local: Arc<TypeContext>) -> Self {
        Mapper {
            reader,
            local,
            cache: HashMap::new(),
        }
    }
}

#[async_trait]
impl Reader for Mapper {
    async fn read(&mut self) -> Result<Option<Record>> {
        let record = match self.reader.read().await? {
            Some(r) => r,
            None => return Ok(None),
        };
        let local = self
            .cache
            .entry(record.schema().id())
            .or_insert_with(|| self.local.translate(record.schema()));
        if Schema::same(local, record.schema()) {
            // Already a local schema; nothing to rewrite.
            return Ok(Some(record));
        }
        Ok(Some(Record::new(
            Arc::clone(local),
            record.payload().clone(),
        )))
    }

    async fn close(&mut self) -> Result<()> {
        self.reader.close().await
    }
}
