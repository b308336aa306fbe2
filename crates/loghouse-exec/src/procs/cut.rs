//! Cut Proc
//!
//! Projects each record to a named subset of fields, preserving the order
//! the query names them. A record whose schema lacks any cut field is
//! dropped, with a warning the first time that schema is seen. Projections
//! are planned once per input schema and cached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use loghouse_core::{Batch, Column, Record, RecordBuilder, Schema, SchemaId};

use crate::context::ExecContext;
use crate::error::Result;
use crate::proc::Proc;

/// Cached projection for one input schema, or `None` when the schema is
/// missing a cut field (records of it are dropped).
struct CutPlan {
    schema: Arc<Schema>,
    indices: Vec<usize>,
}

pub struct CutProc {
    parent: Box<dyn Proc>,
    fields: Vec<String>,
    ctx: ExecContext,
    plans: HashMap<SchemaId, Option<CutPlan>>,
    malformed_warned: HashSet<SchemaId>,
    finished: bool,
}

impl CutProc {
    pub fn new(ctx: ExecContext, parent: Box<dyn Proc>, fields: Vec<String>) -> Self {
        CutProc {
            parent,
            fields,
            ctx,
            plans: HashMap::new(),
            malformed_warned: HashSet::new(),
            finished: false,
        }
    }

    fn plan_for(&mut self, schema: &Arc<Schema>) -> Option<&CutPlan> {
        if !self.plans.contains_key(&schema.id()) {
            let mut indices = Vec::with_capacity(self.fields.len());
            let mut columns = Vec::with_capacity(self.fields.len());
            let mut plan = None;
            let mut missing = None;
            for field in &self.fields {
                match schema.column_index(field) {
                    Some(index) => {
                        indices.push(index);
                        columns.push(schema.columns()[index].clone());
                    }
                    None => {
                        missing = Some(field.clone());
                        break;
                    }
                }
            }
            match missing {
                Some(field) => {
                    self.ctx.warn(format!("cut: field {} not present", field));
                }
                None => {
                    let out_schema = self.ctx.types().lookup_record_type(&columns);
                    plan = Some(CutPlan {
                        schema: out_schema,
                        indices,
                    });
                }
            }
            self.plans.insert(schema.id(), plan);
        }
        self.plans.get(&schema.id()).and_then(Option::as_ref)
    }

    fn project(plan: &CutPlan, record: &Record) -> Result<Record> {
        // One walk of the payload, then emit elements in cut order.
        let mut elements = Vec::with_capacity(record.schema().len());
        for elem in record.elements() {
            elements.push(elem?);
        }
        let mut builder = RecordBuilder::new();
        for (&index, column) in plan.indices.iter().zip(plan.schema.columns()) {
            let bytes = elements.get(index).and_then(|e| e.bytes);
            builder.append_encoded(Column::new(column.name.clone(), column.ty.clone()), bytes);
        }
        Ok(Record::new(Arc::clone(&plan.schema), builder.into_payload()))
    }
}

#[async_trait]
impl Proc for CutProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            let batch = match self.parent.pull().await {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            };
            let mut out = Vec::with_capacity(batch.len());
            for record in batch.iter() {
                let schema = record.schema().clone();
                let plan = match self.plan_for(&schema) {
                    Some(plan) => plan,
                    None => continue, // schema lacks a cut field
                };
                match Self::project(plan, record) {
                    Ok(projected) => out.push(projected),
                    Err(e) => {
                        // Malformed payload: cut requires its fields, so the
                        // record is dropped, once-per-schema warned.
                        if self.malformed_warned.insert(schema.id()) {
                            self.ctx.warn(format!("cut: malformed record: {}", e));
                        }
                    }
                }
            }
            if !out.is_empty() {
                return Ok(Some(Batch::new(out)));
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        self.parent.done().await;
    }
}
