//! DecomposeConditional — name the pieces of a compound condition
//!
//! `if a and b or c and d:` reads as one opaque decision. Binding the
//! operand groups to named locals and testing those names keeps the
//! decision readable and moves the boolean operators out of the branch
//! condition, which is where the metric charges for them.
//!
//! Hoisting operands evaluates them eagerly, so the pattern only matches
//! conditions built entirely from names, literals, comparisons, and `not` —
//! anything that could observably execute (calls, awaits, attribute or
//! subscript access, walrus bindings) makes the condition ineligible and
//! the pattern reports no match.

use crate::ast::{BoolOpKind, Expr, FunctionDef, Stmt};
use crate::patterns::early_return::indent_of_line;
use crate::patterns::{fresh_name, MatchResult, Pattern, PatternId, RewritePlan};

pub struct DecomposeConditional;

impl Pattern for DecomposeConditional {
    fn id(&self) -> PatternId {
        PatternId::DecomposeConditional
    }

    fn priority(&self) -> u8 {
        3
    }

    fn match_function(&self, func: &FunctionDef, source: &str) -> Option<MatchResult> {
        find_site(func, &func.body, source)
    }
}

/// Depth-first search for the first `if` with a decomposable condition
fn find_site(func: &FunctionDef, stmts: &[Stmt], source: &str) -> Option<MatchResult> {
    for stmt in stmts {
        if let Stmt::If {
            test,
            body,
            body_span,
            orelse,
            span,
            ..
        } = stmt
        {
            // Can't insert bindings above an elif line
            let is_elif = span.slice(source).starts_with("elif");
            if !is_elif {
                if let Some(result) = try_condition(func, test, *span, *body_span, source) {
                    return Some(result);
                }
            }
            if let Some(result) = find_site(func, body, source) {
                return Some(result);
            }
            if let Some(result) = find_site(func, orelse, source) {
                return Some(result);
            }
        } else {
            for block in stmt.child_blocks() {
                if let Some(result) = find_site(func, block, source) {
                    return Some(result);
                }
            }
        }
    }
    None
}

fn try_condition(
    func: &FunctionDef,
    test: &Expr,
    if_span: crate::ast::Span,
    body_span: crate::ast::Span,
    source: &str,
) -> Option<MatchResult> {
    let (op, values) = match test {
        Expr::BoolOp { op, values, .. } => (*op, values),
        _ => return None,
    };
    let total_ops = test.bool_op_count();
    if total_ops < 2 || !is_hoistable(test) {
        return None;
    }
    // Single-line `if cond: stmt` bodies have no header line to replace
    if body_span.start_line <= if_span.start_line {
        return None;
    }

    let grouped = values.iter().any(|v| matches!(v, Expr::BoolOp { .. }));
    let (bindings, new_cond, new_ops) = if grouped {
        // Name each compound operand group, keep the top-level joiner
        let mut bindings = Vec::new();
        let mut parts = Vec::new();
        let mut n = 0;
        for value in values {
            if matches!(value, Expr::BoolOp { .. }) {
                n += 1;
                let name = fresh_name(&format!("cond_{}", n), func);
                bindings.push((name.clone(), value.span().slice(source).to_string()));
                parts.push(name);
            } else {
                parts.push(value.span().slice(source).to_string());
            }
        }
        let joined = parts.join(&format!(" {} ", op));
        let new_ops = values.len() - 1;
        (bindings, joined, new_ops)
    } else {
        // Flat chain: one named predicate replaces the whole condition
        let base = match op {
            BoolOpKind::And => "all_checks_pass",
            BoolOpKind::Or => "any_check_passes",
        };
        let name = fresh_name(base, func);
        let text = test.span().slice(source).to_string();
        (vec![(name.clone(), text)], name, 0)
    };

    let delta = total_ops.saturating_sub(new_ops);
    if delta == 0 || bindings.is_empty() {
        return None;
    }

    Some(MatchResult {
        pattern_id: PatternId::DecomposeConditional,
        target_span: func.span,
        estimated_delta: delta as u32,
        plan: RewritePlan::DecomposeConditional {
            if_span,
            header_end_line: body_span.start_line.saturating_sub(1),
            stmt_indent: indent_of_line(source, if_span.start_line),
            bindings,
            new_cond,
        },
    })
}

/// Safe to evaluate eagerly: no calls, no awaits, no attribute/subscript
/// access (those can raise), no walrus bindings
fn is_hoistable(expr: &Expr) -> bool {
    match expr {
        Expr::Name { .. } | Expr::Literal { .. } => true,
        Expr::BoolOp { values, .. } => values.iter().all(is_hoistable),
        Expr::UnaryOp { operand, .. } => is_hoistable(operand),
        Expr::Compare { parts, .. } => parts.iter().all(is_hoistable),
        _ => false,
    }
}
