//! GuardClause — hoist a leading validation check into an early exit
//!
//! `if valid: <bulk> else: return err` at function entry nests the real work
//! under the validation. Rewriting to `if not valid: return err` followed by
//! the flattened bulk keeps the exact same paths: the hoisted exit runs
//! precisely when the original `else` did, so trailing statements after the
//! `if` are unaffected. Without an `else` arm the rewrite is only safe when
//! the `if` is the whole body (the function already fell through to `None`).

use crate::ast::{FunctionDef, Stmt};
use crate::patterns::early_return::indent_of_line;
use crate::patterns::{
    branching_count, contains_named_expr, invert_condition, region_has_unmodeled, MatchResult,
    Pattern, PatternId, RewritePlan,
};

pub struct GuardClause;

impl Pattern for GuardClause {
    fn id(&self) -> PatternId {
        PatternId::GuardClause
    }

    fn priority(&self) -> u8 {
        2
    }

    fn match_function(&self, func: &FunctionDef, source: &str) -> Option<MatchResult> {
        let logic = func.logic_body();
        let (test, bulk, body_span, orelse, orelse_span, span) = match logic.first()? {
            Stmt::If {
                test,
                body,
                body_span,
                orelse,
                orelse_span,
                span,
            } => (test, body, *body_span, orelse, *orelse_span, *span),
            _ => return None,
        };

        if bulk.is_empty() || region_has_unmodeled(bulk) || contains_named_expr(test) {
            return None;
        }

        let (exit_stmt, delta) = match orelse.as_slice() {
            // `else: return X` / `else: raise E` hoists verbatim; the else
            // arm itself comes off the score
            [single @ (Stmt::Return { .. } | Stmt::Raise { .. })] => {
                // An elif arm is not a hoistable exit
                let clause = orelse_span?;
                if !clause.slice(source).starts_with("else") {
                    return None;
                }
                (
                    single.span().slice(source).to_string(),
                    1 + branching_count(bulk),
                )
            }
            [] => {
                // Only safe when nothing follows: the function already
                // returns None past the if
                if logic.len() != 1 {
                    return None;
                }
                let delta = branching_count(bulk);
                if delta == 0 {
                    return None;
                }
                ("return".to_string(), delta)
            }
            _ => return None,
        };

        let guard_indent = indent_of_line(source, span.start_line);
        let body_indent = indent_of_line(source, body_span.start_line);
        if body_indent <= guard_indent {
            return None;
        }

        Some(MatchResult {
            pattern_id: PatternId::GuardClause,
            target_span: func.span,
            estimated_delta: delta as u32,
            plan: RewritePlan::GuardClause {
                if_span: span,
                guard_cond: invert_condition(test, source),
                body_span,
                guard_indent,
                body_indent,
                exit_stmt,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_module;

    fn match_src(source: &str) -> Option<MatchResult> {
        let module = parse_module(source).unwrap();
        GuardClause.match_function(&module.functions[0], source)
    }

    #[test]
    fn test_matches_validation_with_else_return() {
        let source = "def handle(req):
    if req.valid:
        if req.size > 0:
            process(req)
        log(req)
    else:
        return None
    return True
";
        let m = match_src(source).expect("should match");
        assert_eq!(m.pattern_id, PatternId::GuardClause);
        assert_eq!(m.estimated_delta, 2);
        match m.plan {
            RewritePlan::GuardClause {
                ref guard_cond,
                ref exit_stmt,
                ..
            } => {
                assert_eq!(guard_cond, "not req.valid");
                assert_eq!(exit_stmt, "return None");
            }
            other => panic!("wrong plan: {:?}", other),
        }
    }

    #[test]
    fn test_matches_raise_exit() {
        let source = "def check(x):
    if x > 0:
        if x > 10:
            return big(x)
        return small(x)
    else:
        raise ValueError(\"x must be positive\")
";
        let m = match_src(source).expect("should match");
        match m.plan {
            RewritePlan::GuardClause { ref exit_stmt, .. } => {
                assert_eq!(exit_stmt, "raise ValueError(\"x must be positive\")");
            }
            other => panic!("wrong plan: {:?}", other),
        }
    }

    #[test]
    fn test_no_else_with_trailing_code_bails() {
        // Guard would skip the trailing call on the false path
        let source = "def f(x):
    if x:
        if x > 1:
            work(x)
    cleanup()
";
        assert!(match_src(source).is_none());
    }

    #[test]
    fn test_no_else_sole_statement_matches() {
        let source = "def f(x):
    if x:
        if x > 1:
            work(x)
";
        let m = match_src(source).expect("should match");
        match m.plan {
            RewritePlan::GuardClause { ref exit_stmt, .. } => assert_eq!(exit_stmt, "return"),
            other => panic!("wrong plan: {:?}", other),
        }
    }

    #[test]
    fn test_elif_is_not_a_guard_exit() {
        let source = "def f(x):
    if x > 0:
        if x > 1:
            return 1
    elif x < -10:
        return 2
";
        assert!(match_src(source).is_none());
    }

    #[test]
    fn test_docstring_is_skipped_not_matched() {
        let source = "def f(x):
    \"\"\"Docs.\"\"\"
    if x:
        if x > 1:
            return 1
";
        assert!(match_src(source).is_some());
    }
}
