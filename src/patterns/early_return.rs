//! EarlyReturn — invert a trailing `if` into an early exit
//!
//! A function (or loop body) ending in `if cond: <nested work>` keeps every
//! statement of that work one level deeper than it needs to be. Inverting
//! the condition into `if not cond: return` (or `continue` in a loop) and
//! dedenting the body removes one nesting level from everything inside.
//! Only matches when the body actually contains branching, since a flat
//! body gains nothing under the metric.

use crate::ast::{FunctionDef, Stmt};
use crate::patterns::{
    branching_count, contains_named_expr, invert_condition, region_has_unmodeled, MatchResult,
    Pattern, PatternId, RewritePlan,
};
use crate::util::leading_indent;

pub struct EarlyReturn;

impl Pattern for EarlyReturn {
    fn id(&self) -> PatternId {
        PatternId::EarlyReturn
    }

    fn priority(&self) -> u8 {
        1
    }

    fn match_function(&self, func: &FunctionDef, source: &str) -> Option<MatchResult> {
        let body = func.logic_body();

        // A trailing bare `return` changes nothing about the fall-through
        let trimmed = match body.last() {
            Some(Stmt::Return { value: None, .. }) if body.len() > 1 => &body[..body.len() - 1],
            _ => body,
        };

        // Function-level site first, then loop bodies
        if let Some(result) = match_site(func, trimmed, source, "return") {
            return Some(result);
        }
        for stmt in body {
            let (loop_body, exit) = match stmt {
                Stmt::For { body, .. } | Stmt::While { body, .. } => (body.as_slice(), "continue"),
                _ => continue,
            };
            if let Some(result) = match_site(func, loop_body, source, exit) {
                return Some(result);
            }
        }
        None
    }
}

/// Try the trailing statement of one block as an inversion site
fn match_site(
    func: &FunctionDef,
    block: &[Stmt],
    source: &str,
    exit_stmt: &str,
) -> Option<MatchResult> {
    let (test, if_body, body_span, span) = match block.last()? {
        Stmt::If {
            test,
            body,
            body_span,
            orelse,
            span,
            ..
        } if orelse.is_empty() => (test, body, *body_span, *span),
        _ => return None,
    };

    if if_body.is_empty() || region_has_unmodeled(if_body) || contains_named_expr(test) {
        return None;
    }

    // Every branching construct in the body loses one nesting level
    let delta = branching_count(if_body);
    if delta == 0 {
        return None;
    }

    let guard_indent = indent_of_line(source, span.start_line);
    let body_indent = indent_of_line(source, body_span.start_line);
    if body_indent <= guard_indent {
        return None;
    }

    Some(MatchResult {
        pattern_id: PatternId::EarlyReturn,
        target_span: func.span,
        estimated_delta: delta as u32,
        plan: RewritePlan::EarlyReturn {
            if_span: span,
            guard_cond: invert_condition(test, source),
            body_span,
            guard_indent,
            body_indent,
            exit_stmt: exit_stmt.to_string(),
        },
    })
}

pub(crate) fn indent_of_line(source: &str, line: usize) -> usize {
    source
        .lines()
        .nth(line.saturating_sub(1))
        .map(|l| leading_indent(l).len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_module;

    fn match_src(source: &str) -> Option<MatchResult> {
        let module = parse_module(source).unwrap();
        EarlyReturn.match_function(&module.functions[0], source)
    }

    #[test]
    fn test_matches_trailing_nested_if() {
        let source = "def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
";
        let m = match_src(source).expect("should match");
        assert_eq!(m.pattern_id, PatternId::EarlyReturn);
        assert_eq!(m.estimated_delta, 2);
        match m.plan {
            RewritePlan::EarlyReturn {
                ref guard_cond,
                ref exit_stmt,
                ..
            } => {
                assert_eq!(guard_cond, "not items");
                assert_eq!(exit_stmt, "return");
            }
            other => panic!("wrong plan: {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bare_return_is_ignored() {
        let source = "def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
    return
";
        let m = match_src(source).expect("should match past the bare return");
        assert_eq!(m.pattern_id, PatternId::EarlyReturn);
    }

    #[test]
    fn test_flat_body_does_not_match() {
        // No branching inside: inverting gains nothing
        let source = "def f(x):
    if x:
        do_one()
        do_two()
";
        assert!(match_src(source).is_none());
    }

    #[test]
    fn test_if_with_else_does_not_match() {
        let source = "def f(x):
    if x:
        if x > 1:
            return 1
    else:
        return 2
";
        assert!(match_src(source).is_none());
    }

    #[test]
    fn test_loop_site_uses_continue() {
        let source = "def f(items):
    total = 0
    for item in items:
        if item.ok:
            if item.value:
                total += item.value
    return total
";
        let m = match_src(source).expect("should match loop site");
        match m.plan {
            RewritePlan::EarlyReturn { ref exit_stmt, .. } => assert_eq!(exit_stmt, "continue"),
            other => panic!("wrong plan: {:?}", other),
        }
    }

    #[test]
    fn test_match_statement_inside_body_bails() {
        let source = "def f(x):
    if x:
        match x:
            case 1:
                return 1
";
        assert!(match_src(source).is_none());
    }
}
