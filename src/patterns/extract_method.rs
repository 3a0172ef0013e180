//! ExtractMethod — lift a cohesive block into a private helper
//!
//! The most invasive pattern: a contiguous run of statements with one way
//! in, one way out, a closed set of inputs, and at most one live-out
//! variable becomes a private helper function appended after the original,
//! with the run replaced by a call. Branching inside the run moves out of
//! the measured function wholesale.
//!
//! No data-flow analysis beyond read/write scans: a run with early exits,
//! nested closures, awaits, or more than one variable read after the run
//! simply does not match.

use std::collections::BTreeSet;

use crate::ast::{Expr, FunctionDef, Span, Stmt};
use crate::complexity::block_score;
use crate::patterns::{
    assigned_names, region_has_exits, region_has_unmodeled, MatchResult, Pattern, PatternId,
    RewritePlan,
};

pub struct ExtractMethod;

impl Pattern for ExtractMethod {
    fn id(&self) -> PatternId {
        PatternId::ExtractMethod
    }

    fn priority(&self) -> u8 {
        4
    }

    fn match_function(&self, func: &FunctionDef, source: &str) -> Option<MatchResult> {
        let body = func.logic_body();
        let n = body.len();
        if n < 3 {
            return None;
        }

        // Prefer the earliest, largest run; the last statement (usually the
        // return) always stays behind
        for i in 0..n {
            for j in (i + 2..n).rev() {
                let run = &body[i..j];
                if !run_is_liftable(run) {
                    continue;
                }
                let delta = block_score(run);
                if delta < 2 {
                    continue;
                }

                let mut defined_before: BTreeSet<String> =
                    func.params.iter().map(|p| p.name.clone()).collect();
                assigned_names(&body[..i], &mut defined_before);

                let inputs: Vec<String> = ordered_reads(run)
                    .into_iter()
                    .filter(|name| defined_before.contains(name))
                    .collect();

                let mut written = BTreeSet::new();
                assigned_names(run, &mut written);
                let mut after_reads = BTreeSet::new();
                crate::patterns::read_names(&body[j..], &mut after_reads);
                let live_out: Vec<String> =
                    written.iter().filter(|w| after_reads.contains(*w)).cloned().collect();
                if live_out.len() > 1 {
                    continue;
                }
                let output = live_out.into_iter().next();

                let params: Vec<(String, Option<String>)> = inputs
                    .iter()
                    .map(|name| {
                        let annotation = func
                            .params
                            .iter()
                            .find(|p| p.name == *name)
                            .and_then(|p| p.annotation.clone());
                        (name.clone(), annotation)
                    })
                    .collect();

                let helper_name = pick_helper_name(func, output.as_deref(), source);
                let block_span = merge_spans(run);
                let block_indent = crate::patterns::early_return::indent_of_line(
                    source,
                    block_span.start_line,
                );

                return Some(MatchResult {
                    pattern_id: PatternId::ExtractMethod,
                    target_span: func.span,
                    estimated_delta: delta,
                    plan: RewritePlan::ExtractMethod {
                        block_span,
                        block_indent,
                        helper_name,
                        params,
                        output,
                        func_span: func.span,
                        func_indent: func.def_indent,
                    },
                });
            }
        }
        None
    }
}

/// Single entry, single exit, no closure boundaries, nothing unmodeled
fn run_is_liftable(run: &[Stmt]) -> bool {
    if region_has_exits(run) || region_has_unmodeled(run) {
        return false;
    }
    fn stmts_clean(stmts: &[Stmt]) -> bool {
        stmts.iter().all(|s| {
            let own = match s {
                Stmt::FunctionDef { .. } => false,
                Stmt::If { test, .. } | Stmt::While { test, .. } => expr_clean(test),
                Stmt::For { iter, .. } => expr_clean(iter),
                Stmt::Assign { value, .. } | Stmt::Expr { value, .. } => expr_clean(value),
                _ => true,
            };
            own && s.child_blocks().iter().all(|b| stmts_clean(b))
        })
    }
    fn expr_clean(expr: &Expr) -> bool {
        match expr {
            Expr::Lambda { .. } | Expr::Await { .. } | Expr::NamedExpr { .. } => false,
            Expr::BoolOp { values, .. } => values.iter().all(expr_clean),
            Expr::UnaryOp { operand, .. } => expr_clean(operand),
            Expr::Compare { parts, .. } => parts.iter().all(expr_clean),
            Expr::Call { func, args, .. } => expr_clean(func) && args.iter().all(expr_clean),
            Expr::Attribute { value, .. } => expr_clean(value),
            Expr::Subscript { value, index, .. } => expr_clean(value) && expr_clean(index),
            _ => true,
        }
    }
    stmts_clean(run)
}

/// Name reads in first-use order, deduplicated
fn ordered_reads(stmts: &[Stmt]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    collect(stmts, &mut seen, &mut out);

    fn collect(stmts: &[Stmt], seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        for stmt in stmts {
            let mut exprs: Vec<&Expr> = Vec::new();
            match stmt {
                Stmt::If { test, .. } | Stmt::While { test, .. } => exprs.push(test),
                Stmt::For { iter, .. } => exprs.push(iter),
                Stmt::Assign { value, .. } | Stmt::Expr { value, .. } => exprs.push(value),
                Stmt::Return {
                    value: Some(v), ..
                } => exprs.push(v),
                Stmt::Raise { exc: Some(e), .. } => exprs.push(e),
                _ => {}
            }
            for expr in exprs {
                walk(expr, seen, out);
            }
            for block in stmt.child_blocks() {
                collect(block, seen, out);
            }
        }
    }

    fn walk(expr: &Expr, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        match expr {
            Expr::Name { id, .. } => {
                if seen.insert(id.clone()) {
                    out.push(id.clone());
                }
            }
            Expr::BoolOp { values, .. } => values.iter().for_each(|v| walk(v, seen, out)),
            Expr::UnaryOp { operand, .. } => walk(operand, seen, out),
            Expr::Compare { parts, .. } => parts.iter().for_each(|p| walk(p, seen, out)),
            Expr::Call { func, args, .. } => {
                walk(func, seen, out);
                args.iter().for_each(|a| walk(a, seen, out));
            }
            Expr::Attribute { value, .. } => walk(value, seen, out),
            Expr::Subscript { value, index, .. } => {
                walk(value, seen, out);
                walk(index, seen, out);
            }
            Expr::Await { operand, .. } => walk(operand, seen, out),
            _ => {}
        }
    }

    out
}

fn pick_helper_name(func: &FunctionDef, output: Option<&str>, source: &str) -> String {
    let base = match output {
        Some(name) => format!("_compute_{}", name),
        None => format!("_{}_step", func.name),
    };
    let mut candidate = base.clone();
    let mut n = 2;
    while source.contains(&format!("def {}", candidate)) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    candidate
}

fn merge_spans(run: &[Stmt]) -> Span {
    let first = run.first().map(|s| s.span()).unwrap_or_default();
    let last = run.last().map(|s| s.span()).unwrap_or_default();
    Span {
        start_line: first.start_line,
        end_line: last.end_line,
        start_byte: first.start_byte,
        end_byte: last.end_byte,
    }
}
