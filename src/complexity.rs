//! Complexity metric — the Gate 2 yardstick
//!
//! A cognitive-complexity style score over a single function:
//!
//! - each branching construct (`if`, `for`, `while`, `except` clause,
//!   `match`) costs 1 plus its nesting depth at the point it appears;
//! - a non-empty `else`/`elif` arm costs 1 flat;
//! - each `and`/`or` inside a branch condition (`if`/`while` test) costs 1;
//!   boolean operators in plain assignments cost nothing, since no branching
//!   decision is being read there.
//!
//! The score is deterministic and monotonic in branch count and nesting,
//! which is what lets each pattern argue a strict reduction. Recomputation
//! is wall-clock bounded: the recursion checks a deadline per statement and
//! bails with [`DeadlineExceeded`] instead of hanging.

use std::time::Instant;

use crate::ast::{Expr, FunctionDef, Stmt};

/// Deadline hit while recomputing complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded;

/// Score a function with no time bound
pub fn complexity(func: &FunctionDef) -> u32 {
    score_stmts(&func.body, 0, None).unwrap_or(u32::MAX)
}

/// Score a statement block as if it sat at function top level; used by
/// patterns to estimate how much a lifted block is worth
pub(crate) fn block_score(stmts: &[Stmt]) -> u32 {
    score_stmts(stmts, 0, None).unwrap_or(0)
}

/// Score a function, bailing out if `deadline` passes mid-computation
pub fn complexity_with_deadline(
    func: &FunctionDef,
    deadline: Instant,
) -> Result<u32, DeadlineExceeded> {
    score_stmts(&func.body, 0, Some(deadline))
}

fn score_stmts(
    stmts: &[Stmt],
    depth: u32,
    deadline: Option<Instant>,
) -> Result<u32, DeadlineExceeded> {
    let mut total = 0u32;
    for stmt in stmts {
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Err(DeadlineExceeded);
            }
        }
        total += score_stmt(stmt, depth, deadline)?;
    }
    Ok(total)
}

fn score_stmt(stmt: &Stmt, depth: u32, deadline: Option<Instant>) -> Result<u32, DeadlineExceeded> {
    Ok(match stmt {
        Stmt::If {
            test, body, orelse, ..
        } => {
            let mut score = 1 + depth + branch_condition_cost(test);
            score += score_stmts(body, depth + 1, deadline)?;
            if !orelse.is_empty() {
                score += 1;
                score += score_stmts(orelse, depth, deadline)?;
            }
            score
        }
        Stmt::For { body, .. } => 1 + depth + score_stmts(body, depth + 1, deadline)?,
        Stmt::While { test, body, .. } => {
            1 + depth + branch_condition_cost(test) + score_stmts(body, depth + 1, deadline)?
        }
        Stmt::Try {
            body,
            handlers,
            finally,
            ..
        } => {
            let mut score = score_stmts(body, depth, deadline)?;
            for handler in handlers {
                score += 1 + depth + score_stmts(handler, depth + 1, deadline)?;
            }
            score += score_stmts(finally, depth, deadline)?;
            score
        }
        Stmt::With { body, .. } => score_stmts(body, depth, deadline)?,
        Stmt::Match { .. } => 1 + depth,
        // Nested defs are separate scoring units; their bodies do not count
        // against the enclosing function
        Stmt::FunctionDef { .. } => 0,
        _ => 0,
    })
}

/// Boolean operators read inside a branching decision
fn branch_condition_cost(test: &Expr) -> u32 {
    test.bool_op_count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_module;
    use std::time::Duration;

    fn score(source: &str) -> u32 {
        let module = parse_module(source).unwrap();
        complexity(&module.functions[0])
    }

    #[test]
    fn test_flat_function_scores_zero() {
        assert_eq!(score("def f(x):\n    return x\n"), 0);
    }

    #[test]
    fn test_single_if() {
        assert_eq!(score("def f(x):\n    if x:\n        return 1\n    return 0\n"), 1);
    }

    #[test]
    fn test_nesting_costs_more() {
        let nested = "def f(a, b, c):
    if a:
        if b:
            if c:
                return 1
    return 0
";
        // depths 0, 1, 2 -> 1 + 2 + 3
        assert_eq!(score(nested), 6);
    }

    #[test]
    fn test_else_adds_one() {
        let src = "def f(x):
    if x:
        return 1
    else:
        return 2
";
        assert_eq!(score(src), 2);
    }

    #[test]
    fn test_bool_ops_in_condition_count() {
        let src = "def f(a, b, c):
    if a and b and c:
        return 1
    return 0
";
        assert_eq!(score(src), 3);
    }

    #[test]
    fn test_bool_ops_in_assignment_are_free() {
        let src = "def f(a, b, c):
    ok = a and b and c
    if ok:
        return 1
    return 0
";
        assert_eq!(score(src), 1);
    }

    #[test]
    fn test_deadline_exceeded() {
        let module = parse_module("def f(x):\n    if x:\n        return 1\n    return 0\n").unwrap();
        let past = Instant::now() - Duration::from_secs(1);
        assert_eq!(
            complexity_with_deadline(&module.functions[0], past),
            Err(DeadlineExceeded)
        );
    }

    #[test]
    fn test_determinism() {
        let src = "def f(a, b):
    if a:
        for x in b:
            if x:
                return x
    return None
";
        assert_eq!(score(src), score(src));
    }
}
