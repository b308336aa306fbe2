//! Filter Proc
//!
//! Applies a compiled predicate to each record and forwards the matches.
//! A pull that matches nothing keeps pulling upstream rather than emitting
//! an empty batch.

use async_trait::async_trait;
use loghouse_core::Batch;
use loghouse_expr::Filter;

use crate::error::Result;
use crate::proc::Proc;

pub struct FilterProc {
    parent: Box<dyn Proc>,
    filter: Filter,
    finished: bool,
}

impl FilterProc {
    pub fn new(parent: Box<dyn Proc>, filter: Filter) -> Self {
        FilterProc {
            parent,
            filter,
            finished: false,
        }
    }
}

#[async_trait]
impl Proc for FilterProc {
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
            let matched: Vec<_> = batch
                .iter()
                .filter(|r| (self.filter)(r))
                .cloned()
                .collect();
            if !matched.is_empty() {
                return Ok(Some(Batch::new(matched)));
            }
        }
    }

    async fn done(&mut self) {
        self.finished = true;
        self.parent.done().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procs::testutil::{drain, exec_ctx, hosts, rec, source};
    use loghouse_ast::{BooleanExpr, FieldExpr, TypedValue};
    use loghouse_expr::compile_filter;

    fn host_eq(host: &str) -> Filter {
        compile_filter(&BooleanExpr::CompareField {
            comparator: "=".to_string(),
            field: FieldExpr::read("host"),
            value: TypedValue::new("string", host),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_keeps_only_matches() {
        let (ctx, _rx) = exec_ctx();
        let records = vec![rec(&ctx, 1, "a", 3), rec(&ctx, 2, "b", 4)];
        let mut proc = FilterProc::new(source(&ctx, records), host_eq("a"));
        let out = drain(&mut proc).await;
        assert_eq!(hosts(&out), vec!["a"]);
    }

    #[tokio::test]
    async fn test_no_match_is_clean_eos() {
        let (ctx, _rx) = exec_ctx();
        let records = vec![rec(&ctx, 1, "a", 3)];
        let mut proc = FilterProc::new(source(&ctx, records), host_eq("z"));
        assert!(drain(&mut proc).await.is_empty());
        // Pulls after end of stream stay at end of stream.
        assert!(proc.pull().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_true_filter_is_identity() {
        let (ctx, _rx) = exec_ctx();
        let records = vec![
            rec(&ctx, 1, "a", 1),
            rec(&ctx, 2, "b", 2),
            rec(&ctx, 3, "c", 3),
        ];
        let filter = compile_filter(&BooleanExpr::BooleanLiteral { value: true }).unwrap();
        let mut proc = FilterProc::new(source(&ctx, records), filter);
        let out = drain(&mut proc).await;
        assert_eq!(hosts(&out), vec!["a", "b", "c"]);
    }
}
