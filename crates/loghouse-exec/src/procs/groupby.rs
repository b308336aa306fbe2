//! Group-By Proc
//!
//! Partitions input by the string-canonicalized concatenation of key-field
//! values and runs an independent reducer set per group.
//!
//! ## Time binning
//! With a bin duration D > 0, the partition key is augmented with
//! `floor(ts / D)` and the output grows a leading `ts` column holding the
//! bin start. Inputs are assumed monotonic in `ts`, so the moment a record
//! crosses into a later bin every earlier bin is complete and flushes
//! immediately — a day-long scan streams results per bin instead of
//! holding the whole day. Records without a usable `ts` are dropped with a
//! once-per-schema warning, since they cannot be placed in any bin.
//!
//! ## Cardinality bound
//! At most `limit` distinct groups are tracked. Once the table is full,
//! records for *new* groups are discarded (existing groups keep updating)
//! and one warning is raised.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use loghouse_core::{Batch, Record, RecordBuilder, SchemaId, Ts, Type, Value};
use loghouse_expr::Resolver;

use crate::context::ExecContext;
use crate::error::Result;
use crate::proc::Proc;
use crate::reducer::{ReducerInst, ReducerSpec};

struct GroupRow {
    bin: Option<Ts>,
    key_values: Vec<Option<Value>>,
    reducers: Vec<ReducerInst>,
    /// Insertion order, the tie-break within a bin at final flush.
    order: usize,
}

pub struct GroupByProc {
    parent: Box<dyn Proc>,
    ctx: ExecContext,
    key_names: Vec<String>,
    key_resolvers: Vec<Resolver>,
    reducer_specs: Vec<ReducerSpec>,
    /// Bin width in nanoseconds; 0 disables time binning.
    duration: i64,
    limit: usize,
    table: HashMap<String, GroupRow>,
    inserted: usize,
    current_bin: Option<Ts>,
    ready: VecDeque<Batch>,
    batch_size: usize,
    overflowed: bool,
    no_ts_warned: HashSet<SchemaId>,
    parent_done: bool,
    finished: bool,
}

impl GroupByProc {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: ExecContext,
        parent: Box<dyn Proc>,
        key_names: Vec<String>,
        key_resolvers: Vec<Resolver>,
        reducer_specs: Vec<ReducerSpec>,
        duration: i64,
        limit: usize,
        batch_size: usize,
    ) -> Self {
        GroupByProc {
            parent,
            ctx,
            key_names,
            key_resolvers,
            reducer_specs,
            duration,
            limit: limit.max(1),
            table: HashMap::new(),
            inserted: 0,
            current_bin: None,
            ready: VecDeque::new(),
            batch_size: batch_size.max(1),
            overflowed: false,
            no_ts_warned: HashSet::new(),
            parent_done: false,
            finished: false,
        }
    }

    fn consume(&mut self, record: &Record) {
        let bin = if self.duration > 0 {
            match record.ts() {
                Some(ts) => {
                    let bin = ts.trunc(self.duration);
                    if let Some(current) = self.current_bin {
                        if bin > current {
                            self.flush_completed(bin);
                        }
                    }
                    if self.current_bin.map_or(true, |c| bin > c) {
                        self.current_bin = Some(bin);
                    }
                    Some(bin)
                }
                None => {
                    if self.no_ts_warned.insert(record.schema().id()) {
                        self.ctx
                            .warn("groupby: record without ts dropped from time bins");
                    }
                    return;
                }
            }
        } else {
            None
        };

        let key_values: Vec<Option<Value>> =
            self.key_resolvers.iter().map(|r| r(record)).collect();
        let mut key = String::new();
        if let Some(bin) = bin {
            key.push_str(&bin.nanos().to_string());
        }
        for value in &key_values {
            key.push('\u{0}');
            match value {
                Some(v) => key.push_str(&v.format()),
                None => key.push('-'),
            }
        }

        if !self.table.contains_key(&key) {
            if self.table.len() >= self.limit {
                if !self.overflowed {
                    self.overflowed = true;
                    self.ctx.warn("groupby: group limit reached");
                }
                return;
            }
            let row = GroupRow {
                bin,
                key_values,
                reducers: self
                    .reducer_specs
                    .iter()
                    .map(ReducerSpec::instantiate)
                    .collect(),
                order: self.inserted,
            };
            self.inserted += 1;
            self.table.insert(key.clone(), row);
        }
        let row = self.table.get_mut(&key).expect("group row present");
        for reducer in &mut row.reducers {
            reducer.update(record);
        }
    }

    /// Flush every group in a bin strictly before `next_bin`.
    fn flush_completed(&mut self, next_bin: Ts) {
        let complete: Vec<String> = self
            .table
            .iter()
            .filter(|(_, row)| row.bin.map_or(false, |b| b < next_bin))
            .map(|(k, _)| k.clone())
            .collect();
        let mut rows: Vec<GroupRow> = complete
            .into_iter()
            .filter_map(|k| self.table.remove(&k))
            .collect();
        rows.sort_by_key(|row| (row.bin, row.order));
        self.stage(rows);
    }

    fn flush_all(&mut self) {
        let mut rows: Vec<GroupRow> = self.table.drain().map(|(_, row)| row).collect();
        rows.sort_by_key(|row| (row.bin, row.order));
        self.stage(rows);
    }

    fn stage(&mut self, rows: Vec<GroupRow>) {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.row_record(row));
        }
        for chunk in records.chunks(self.batch_size) {
            self.ready.push_back(Batch::new(chunk.to_vec()));
        }
    }

    fn row_record(&self, row: GroupRow) -> Record {
        let mut builder = RecordBuilder::new();
        if let Some(bin) = row.bin {
            builder.append_time("ts", bin);
        }
        for (name, value) in self.key_names.iter().zip(row.key_values) {
            match value {
                Some(v) => builder.append(name.clone(), &v),
                // A group keyed on a missing field: typed as string, null.
                None => builder.append_null(name.clone(), Type::String),
            }
        }
        for reducer in &row.reducers {
            builder.append(reducer.name().to_string(), &reducer.result());
        }
        builder.build(self.ctx.types())
    }
}

#[async_trait]
impl Proc for GroupByProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        loop {
            if let Some(batch) = self.ready.pop_front() {
                return Ok(Some(batch));
            }
            if self.finished {
                return Ok(None);
            }
            if self.parent_done {
                self.finished = true;
                self.flush_all();
                continue;
            }
            match self.parent.pull().await {
                Ok(Some(batch)) => {
                    for record in batch.iter() {
                        self.consume(record);
                    }
                }
                Ok(None) => {
                    self.parent_done = true;
                }
                Err(e) => {
                    self.finished = true;
                    self.table.clear();
                    self.ready.clear();
                    return Err(e);
                }
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        self.table.clear();
        self.ready.clear();
        self.parent.done().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procs::testutil::{drain, exec_ctx, rec, source};
    use loghouse_core::value::{decode_int, decode_uint};
    use loghouse_expr::compile_field_path;

    fn sum_n() -> Vec<ReducerSpec> {
        vec![ReducerSpec::compile(&loghouse_ast::Reducer::new("sum", Some("n"))).unwrap()]
    }

    fn count() -> Vec<ReducerSpec> {
        vec![ReducerSpec::compile(&loghouse_ast::Reducer::new("count", None)).unwrap()]
    }

    fn by_host(ctx: &ExecContext, records: Vec<Record>, specs: Vec<ReducerSpec>) -> GroupByProc {
        GroupByProc::new(
            ctx.clone(),
            source(ctx, records),
            vec!["host".to_string()],
            vec![compile_field_path("host")],
            specs,
            0,
            1_000_000,
            100,
        )
    }

    fn host_of(rec: &Record) -> String {
        let v = rec.value_by_name("host").unwrap().unwrap();
        String::from_utf8(v.bytes.as_deref().unwrap().to_vec()).unwrap()
    }

    fn sum_of(rec: &Record) -> i64 {
        let v = rec.value_by_name("sum").unwrap().unwrap();
        decode_int(v.bytes.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_groups_by_key() {
        let (ctx, _rx) = exec_ctx();
        let records = vec![
            rec(&ctx, 1, "a", 1),
            rec(&ctx, 2, "b", 2),
            rec(&ctx, 3, "a", 4),
        ];
        let mut proc = by_host(&ctx, records, sum_n());
        let mut out: Vec<(String, i64)> = drain(&mut proc)
            .await
            .iter()
            .map(|r| (host_of(r), sum_of(r)))
            .collect();
        out.sort();
        assert_eq!(out, vec![("a".to_string(), 5), ("b".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_time_binned_counts_flush_in_ts_order() {
        let (ctx, _rx) = exec_ctx();
        let records: Vec<_> = [0i64, 3, 9, 11, 15, 22, 25]
            .iter()
            .map(|&ts| rec(&ctx, ts, "a", 1))
            .collect();
        let mut proc = GroupByProc::new(
            ctx.clone(),
            source(&ctx, records),
            Vec::new(),
            Vec::new(),
            count(),
            10,
            1_000_000,
            100,
        );
        let out = drain(&mut proc).await;
        let bins: Vec<(i64, u64)> = out
            .iter()
            .map(|r| {
                let count = r.value_by_name("count").unwrap().unwrap();
                (
                    r.ts().unwrap().nanos(),
                    decode_uint(count.bytes.as_deref().unwrap()).unwrap(),
                )
            })
            .collect();
        assert_eq!(bins, vec![(0, 3), (10, 2), (20, 2)]);
    }

    #[tokio::test]
    async fn test_streaming_flush_before_eos() {
        let (ctx, _rx) = exec_ctx();
        // Two bins; batch size 1 so the first bin can flush mid-stream.
        let records: Vec<_> = [1i64, 15].iter().map(|&ts| rec(&ctx, ts, "a", 1)).collect();
        let scanner = crate::scanner::Scanner::new(
            ctx.clone(),
            Box::new(crate::io::ArrayReader::new(records)),
            None,
            1,
        );
        let mut proc = GroupByProc::new(
            ctx.clone(),
            Box::new(scanner),
            Vec::new(),
            Vec::new(),
            count(),
            10,
            1_000_000,
            100,
        );
        // First pull already carries the completed 0-bin.
        let first = proc.pull().await.unwrap().unwrap();
        assert_eq!(first.get(0).unwrap().ts(), Some(Ts(0)));
    }

    #[tokio::test]
    async fn test_group_limit_discards_new_groups() {
        let (ctx, mut rx) = exec_ctx();
        let records = vec![
            rec(&ctx, 1, "a", 1),
            rec(&ctx, 2, "b", 2),
            rec(&ctx, 3, "c", 4), // over the limit of 2: discarded
            rec(&ctx, 4, "a", 8), // existing group keeps updating
        ];
        let mut proc = GroupByProc::new(
            ctx.clone(),
            source(&ctx, records),
            vec!["host".to_string()],
            vec![compile_field_path("host")],
            sum_n(),
            0,
            2,
            100,
        );
        let mut out: Vec<(String, i64)> = drain(&mut proc)
            .await
            .iter()
            .map(|r| (host_of(r), sum_of(r)))
            .collect();
        out.sort();
        assert_eq!(out, vec![("a".to_string(), 9), ("b".to_string(), 2)]);
        assert_eq!(rx.recv().await.unwrap(), "groupby: group limit reached");
    }

    #[tokio::test]
    async fn test_null_key_groups_together() {
        let (ctx, _rx) = exec_ctx();
        let mut no_host = Vec::new();
        for n in [1i64, 2] {
            let mut b = RecordBuilder::new();
            b.append_int64("n", n);
            no_host.push(b.build(ctx.types()));
        }
        let mut records = vec![rec(&ctx, 1, "a", 10)];
        records.extend(no_host);

        let mut proc = by_host(&ctx, records, sum_n());
        let out = drain(&mut proc).await;
        assert_eq!(out.len(), 2);
        let total: i64 = out.iter().map(sum_of).sum();
        assert_eq!(total, 13);
    }
}
