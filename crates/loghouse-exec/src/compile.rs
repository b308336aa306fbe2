//! The Query Compiler
//!
//! Walks the query AST and assembles the running proc graph:
//!
//! - `SequentialProc` chains stages left to right.
//! - `ParallelProc` fans the upstream out through a tee — one bounded
//!   channel per branch — and the branches' terminals become the channels
//!   of the sink multiplexer.
//! - Constant filters fold away: `filter true` disappears, `filter false`
//!   becomes an immediate end of stream that still cancels upstream.
//! - A leading non-constant filter is pushed down into the leaf scanner, so
//!   the scanner's matched counters reflect it.
//! - `head` hoists ahead of adjacent `pass` stages; nothing else is
//!   order-insensitive enough to hoist across.
//!
//! Semantically invalid combinations are rejected here, before anything
//! runs: zero-count head/tail/top, sorts without keys, group-by keys that
//! name a reducer output, and time-binned group-by under a reversed scan
//! (bin flushing needs forward-monotonic timestamps).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loghouse_ast as ast;
use loghouse_core::{Batch, TypeContext};
use loghouse_expr::{
    compile_field_expr, compile_field_path, compile_filter_with_warnings, sort_fn, SortKey,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ExecConfig;
use crate::context::ExecContext;
use crate::error::{ExecError, Result};
use crate::io::Reader;
use crate::mux::MuxOutput;
use crate::proc::Proc;
use crate::procs::{
    AggProc, CutProc, FilterProc, GroupByProc, HeadProc, PassProc, SortProc, TailProc, TopProc,
    UniqProc,
};
use crate::reducer::ReducerSpec;
use crate::scanner::Scanner;

/// Compile a query over one (already combined and mapped) record source.
///
/// Must be called from within a tokio runtime: parallel subtrees spawn
/// their tee and channel tasks at construction.
pub fn compile(
    node: &ast::Proc,
    reader: Box<dyn Reader>,
    types: Arc<TypeContext>,
    config: &ExecConfig,
) -> Result<MuxOutput> {
    let (ctx, warnings) = ExecContext::new(types);
    let node = normalize(node.clone());
    validate(&node, config)?;

    let (scan_filter, rest) = split_scan_filter(&ctx, node)?;
    let scanner = Scanner::new(ctx.clone(), reader, scan_filter, config.batch_size);
    let stats = scanner.stats();

    let terminals = compile_proc(&ctx, &rest, Box::new(scanner), config)?;
    tracing::debug!(channels = terminals.len(), "query compiled");
    Ok(MuxOutput::new(&ctx, warnings, terminals, stats))
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn normalize(node: ast::Proc) -> ast::Proc {
    match node {
        ast::Proc::SequentialProc { procs } => {
            let mut procs: Vec<ast::Proc> = procs.into_iter().map(normalize).collect();
            hoist_heads(&mut procs);
            ast::Proc::SequentialProc { procs }
        }
        ast::Proc::ParallelProc { procs } => ast::Proc::ParallelProc {
            procs: procs.into_iter().map(normalize).collect(),
        },
        // filter true is the identity.
        ast::Proc::FilterProc {
            filter: ast::BooleanExpr::BooleanLiteral { value: true },
        } => ast::Proc::PassProc,
        other => other,
    }
}

/// Bubble every head ahead of adjacent pass stages.
fn hoist_heads(procs: &mut [ast::Proc]) {
    let mut swapped = true;
    while swapped {
        swapped = false;
        for i in 1..procs.len() {
            if matches!(procs[i], ast::Proc::HeadProc { .. })
                && matches!(procs[i - 1], ast::Proc::PassProc)
            {
                procs.swap(i - 1, i);
                swapped = true;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(node: &ast::Proc, config: &ExecConfig) -> Result<()> {
    let fail = |msg: String| Err(ExecError::Compile(msg));
    match node {
        ast::Proc::SequentialProc { procs } | ast::Proc::ParallelProc { procs } => {
            if procs.is_empty() {
                return fail("empty proc list".to_string());
            }
            for p in procs {
                validate(p, config)?;
            }
            Ok(())
        }
        ast::Proc::HeadProc { count } | ast::Proc::TailProc { count } => {
            if *count == 0 {
                return fail("head/tail requires a positive count".to_string());
            }
            Ok(())
        }
        ast::Proc::SortProc { fields, .. } => {
            if fields.is_empty() {
                return fail("sort requires at least one field".to_string());
            }
            Ok(())
        }
        ast::Proc::TopProc { fields, limit } => {
            if fields.is_empty() {
                return fail("top requires at least one field".to_string());
            }
            if *limit == 0 {
                return fail("top requires a positive limit".to_string());
            }
            Ok(())
        }
        ast::Proc::ReducerProc { reducers, .. } => {
            if reducers.is_empty() {
                return fail("reducer proc requires at least one reducer".to_string());
            }
            Ok(())
        }
        ast::Proc::GroupByProc {
            keys,
            reducers,
            duration,
            ..
        } => {
            if *duration < 0 {
                return fail("group-by duration must be non-negative".to_string());
            }
            if *duration > 0 && config.reverse {
                return fail(
                    "time-binned group-by requires a forward scan".to_string(),
                );
            }
            for key in keys {
                let collides = reducers.iter().any(|r| {
                    let name = if r.var.is_empty() { r.op.as_str() } else { r.var.as_str() };
                    name == key
                });
                if collides {
                    return fail(format!(
                        "group-by key {} references a reducer output",
                        key
                    ));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Scanner filter pushdown
// ---------------------------------------------------------------------------

fn is_constant(expr: &ast::BooleanExpr) -> bool {
    matches!(expr, ast::BooleanExpr::BooleanLiteral { .. })
}

/// Peel a leading non-constant filter off the query for the scanner.
fn split_scan_filter(
    ctx: &ExecContext,
    node: ast::Proc,
) -> Result<(Option<loghouse_expr::Filter>, ast::Proc)> {
    match node {
        ast::Proc::FilterProc { filter } if !is_constant(&filter) => {
            let compiled = compile_filter_with_warnings(&filter, ctx.warn_fn())?;
            Ok((Some(compiled), ast::Proc::PassProc))
        }
        ast::Proc::SequentialProc { mut procs }
            if matches!(
                procs.first(),
                Some(ast::Proc::FilterProc { filter }) if !is_constant(filter)
            ) =>
        {
            let first = procs.remove(0);
            let filter = match first {
                ast::Proc::FilterProc { filter } => filter,
                _ => unreachable!("matched above"),
            };
            let compiled = compile_filter_with_warnings(&filter, ctx.warn_fn())?;
            let rest = if procs.is_empty() {
                ast::Proc::PassProc
            } else {
                ast::Proc::SequentialProc { procs }
            };
            Ok((Some(compiled), rest))
        }
        other => Ok((None, other)),
    }
}

// ---------------------------------------------------------------------------
// Graph assembly
// ---------------------------------------------------------------------------

fn compile_proc(
    ctx: &ExecContext,
    node: &ast::Proc,
    parent: Box<dyn Proc>,
    config: &ExecConfig,
) -> Result<Vec<Box<dyn Proc>>> {
    match node {
        ast::Proc::SequentialProc { procs } => {
            let mut current = parent;
            let last = procs.len() - 1;
            for (i, p) in procs.iter().enumerate() {
                let mut outs = compile_proc(ctx, p, current, config)?;
                if outs.len() == 1 {
                    current = outs.pop().expect("one output");
                } else {
                    if i != last {
                        return Err(ExecError::Compile(
                            "parallel fan-out must be the last stage in a sequence".to_string(),
                        ));
                    }
                    return Ok(outs);
                }
            }
            Ok(vec![current])
        }
        ast::Proc::ParallelProc { procs } => {
            let branches = tee(ctx, parent, procs.len());
            let mut terminals = Vec::new();
            for (p, branch) in procs.iter().zip(branches) {
                terminals.extend(compile_proc(ctx, p, branch, config)?);
            }
            Ok(terminals)
        }
        ast::Proc::FilterProc { filter } => match filter {
            ast::BooleanExpr::BooleanLiteral { value: true } => Ok(vec![parent]),
            ast::BooleanExpr::BooleanLiteral { value: false } => {
                Ok(vec![Box::new(NullProc::new(parent))])
            }
            expr => {
                let compiled = compile_filter_with_warnings(expr, ctx.warn_fn())?;
                Ok(vec![Box::new(FilterProc::new(parent, compiled))])
            }
        },
        ast::Proc::PassProc => Ok(vec![Box::new(PassProc::new(parent))]),
        ast::Proc::HeadProc { count } => Ok(vec![Box::new(HeadProc::new(parent, *count))]),
        ast::Proc::TailProc { count } => Ok(vec![Box::new(TailProc::new(parent, *count))]),
        ast::Proc::CutProc { fields } => Ok(vec![Box::new(CutProc::new(
            ctx.clone(),
            parent,
            fields.clone(),
        ))]),
        ast::Proc::UniqProc { cflag } => Ok(vec![Box::new(UniqProc::new(
            ctx.clone(),
            parent,
            *cflag,
        ))]),
        ast::Proc::SortProc {
            fields,
            limit,
            sortdir,
        } => {
            let cmp = sort_fn(config.nulls_max, sort_keys(fields, *sortdir, config)?);
            let limit = if *limit == 0 {
                config.sort_limit
            } else {
                *limit as usize
            };
            Ok(vec![Box::new(SortProc::new(
                ctx.clone(),
                parent,
                cmp,
                limit,
                config.batch_size,
            ))])
        }
        ast::Proc::TopProc { fields, limit } => {
            let cmp = sort_fn(config.nulls_max, sort_keys(fields, 1, config)?);
            Ok(vec![Box::new(TopProc::new(parent, cmp, *limit))])
        }
        ast::Proc::ReducerProc {
            reducers,
            update_interval,
        } => {
            let specs = reducers
                .iter()
                .map(ReducerSpec::compile)
                .collect::<Result<Vec<_>>>()?;
            Ok(vec![Box::new(AggProc::new(
                ctx.clone(),
                parent,
                &specs,
                interval(*update_interval),
            ))])
        }
        ast::Proc::GroupByProc {
            keys,
            reducers,
            duration,
            limit,
            ..
        } => {
            let specs = reducers
                .iter()
                .map(ReducerSpec::compile)
                .collect::<Result<Vec<_>>>()?;
            // With time binning on, the bin itself is the ts key.
            let key_names: Vec<String> = keys
                .iter()
                .filter(|k| !(*duration > 0 && k.as_str() == "ts"))
                .cloned()
                .collect();
            let key_resolvers = key_names
                .iter()
                .map(|name| compile_field_path(name))
                .collect();
            let limit = if *limit == 0 {
                config.group_limit
            } else {
                *limit as usize
            };
            Ok(vec![Box::new(GroupByProc::new(
                ctx.clone(),
                parent,
                key_names,
                key_resolvers,
                specs,
                *duration,
                limit,
                config.batch_size,
            ))])
        }
    }
}

fn sort_keys(
    fields: &[ast::FieldExpr],
    sortdir: i32,
    config: &ExecConfig,
) -> Result<Vec<SortKey>> {
    let descending = (sortdir < 0) != config.reverse;
    fields
        .iter()
        .map(|f| {
            let resolver = compile_field_expr(f)?;
            Ok(if descending {
                SortKey::descending(resolver)
            } else {
                SortKey::ascending(resolver)
            })
        })
        .collect()
}

fn interval(ns: i64) -> Option<Duration> {
    if ns > 0 {
        Some(Duration::from_nanos(ns as u64))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Constant-false filter
// ---------------------------------------------------------------------------

/// Ends the stream immediately, canceling upstream on the first pull.
struct NullProc {
    parent: Box<dyn Proc>,
    canceled: bool,
}

impl NullProc {
    fn new(parent: Box<dyn Proc>) -> Self {
        NullProc {
            parent,
            canceled: false,
        }
    }
}

#[async_trait]
impl Proc for NullProc {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if !self.canceled {
            self.canceled = true;
            self.parent.done().await;
        }
        Ok(None)
    }

    async fn done(&mut self) {
        self.canceled = true;
        self.parent.done().await;
    }
}

// ---------------------------------------------------------------------------
// Tee
// ---------------------------------------------------------------------------

type TeeItem = Result<Option<Batch>>;

/// Fan one upstream out to `n` branch procs through bounded channels.
fn tee(ctx: &ExecContext, parent: Box<dyn Proc>, n: usize) -> Vec<Box<dyn Proc>> {
    let mut senders = Vec::with_capacity(n);
    let mut branches: Vec<Box<dyn Proc>> = Vec::with_capacity(n);
    for _ in 0..n {
        let (tx, rx) = mpsc::channel::<TeeItem>(1);
        senders.push(Some(tx));
        branches.push(Box::new(TeeBranch {
            rx,
            finished: false,
        }));
    }
    tokio::spawn(run_tee(parent, senders, ctx.cancellation()));
    branches
}

async fn run_tee(
    mut upstream: Box<dyn Proc>,
    mut senders: Vec<Option<mpsc::Sender<TeeItem>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                upstream.done().await;
                return;
            }
            result = upstream.pull() => match result {
                Ok(Some(batch)) => {
                    let mut alive = false;
                    for slot in senders.iter_mut() {
                        if let Some(tx) = slot {
                            if tx.send(Ok(Some(batch.clone()))).await.is_err() {
                                // Branch hung up (head finished, for one).
                                *slot = None;
                            } else {
                                alive = true;
                            }
                        }
                    }
                    if !alive {
                        upstream.done().await;
                        return;
                    }
                }
                Ok(None) => {
                    for slot in senders.iter_mut() {
                        if let Some(tx) = slot.take() {
                            let _ = tx.send(Ok(None)).await;
                        }
                    }
                    return;
                }
                Err(error) => {
                    // Errors propagate exactly once: the first branch that
                    // accepts it carries it, the rest see end of stream.
                    let mut error = Some(error);
                    for slot in senders.iter_mut() {
                        if let Some(tx) = slot.take() {
                            match error.take() {
                                Some(e) => {
                                    if let Err(send_err) = tx.send(Err(e)).await {
                                        // Branch hung up; pass the error on.
                                        if let Err(e) = send_err.0 {
                                            error = Some(e);
                                        }
                                    }
                                }
                                None => {
                                    let _ = tx.send(Ok(None)).await;
                                }
                            }
                        }
                    }
                    return;
                }
            }
        }
    }
}

struct TeeBranch {
    rx: mpsc::Receiver<TeeItem>,
    finished: bool,
}

#[async_trait]
impl Proc for TeeBranch {
    async fn pull(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Ok(Some(batch))) => Ok(Some(batch)),
            Some(Ok(None)) | None => {
                self.finished = true;
                Ok(None)
            }
            Some(Err(e)) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        // Closing the receiver makes the tee's next send fail, which is how
        // it learns this branch is gone.
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_true_folds_to_pass() {
        let node = normalize(ast::Proc::FilterProc {
            filter: ast::BooleanExpr::BooleanLiteral { value: true },
        });
        assert_eq!(node, ast::Proc::PassProc);
    }

    #[test]
    fn test_head_hoists_past_pass() {
        let node = normalize(ast::Proc::SequentialProc {
            procs: vec![
                ast::Proc::PassProc,
                ast::Proc::PassProc,
                ast::Proc::HeadProc { count: 1 },
            ],
        });
        match node {
            ast::Proc::SequentialProc { procs } => {
                assert_eq!(procs[0], ast::Proc::HeadProc { count: 1 });
                assert_eq!(procs[1], ast::Proc::PassProc);
                assert_eq!(procs[2], ast::Proc::PassProc);
            }
            _ => panic!("expected sequential"),
        }
    }

    #[test]
    fn test_head_does_not_hoist_past_filter() {
        let filter = ast::Proc::FilterProc {
            filter: ast::BooleanExpr::CompareField {
                comparator: "=".to_string(),
                field: ast::FieldExpr::read("host"),
                value: ast::TypedValue::new("string", "a"),
            },
        };
        let node = normalize(ast::Proc::SequentialProc {
            procs: vec![filter.clone(), ast::Proc::HeadProc { count: 1 }],
        });
        match node {
            ast::Proc::SequentialProc { procs } => {
                assert_eq!(procs[0], filter);
            }
            _ => panic!("expected sequential"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_sequence() {
        let err = validate(
            &ast::Proc::SequentialProc { procs: Vec::new() },
            &ExecConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty proc list"));
    }

    #[test]
    fn test_validate_rejects_negative_duration() {
        let err = validate(
            &ast::Proc::GroupByProc {
                keys: Vec::new(),
                reducers: vec![ast::Reducer::new("count", None)],
                duration: -5,
                update_interval: 0,
                limit: 0,
            },
            &ExecConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[tokio::test]
    async fn test_parallel_mid_sequence_rejected() {
        let node = ast::Proc::SequentialProc {
            procs: vec![
                ast::Proc::ParallelProc {
                    procs: vec![ast::Proc::PassProc, ast::Proc::PassProc],
                },
                ast::Proc::HeadProc { count: 1 },
            ],
        };
        let types = Arc::new(TypeContext::new());
        let err = compile(
            &node,
            Box::new(crate::io::ArrayReader::new(Vec::new())),
            types,
            &ExecConfig::default(),
        )
        .map(|_| ())
        .unwrap_err();
        assert!(err.to_string().contains("last stage"));
    }
}
