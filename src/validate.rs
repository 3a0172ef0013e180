//! Four-gate validation of a proposed rewrite
//!
//! Every candidate edit runs the same ordered gauntlet against the pristine
//! original: syntax, complexity, behavior, formatting. Gates short-circuit —
//! the first failure is recorded and the rest are skipped. A rewrite is
//! accepted only when all four pass; a failure is data for the engine's
//! retry policy, not an error.
//!
//! The behavior gate is deliberately conservative. It compares structural
//! fingerprints of the target function (signature, return shapes, raise and
//! closure counts, statement inventory) rather than proving equivalence, so
//! it can reject a good edit but is very unlikely to pass a bad one.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ast::{Expr, FunctionDef, LiteralKind, ModuleAst, Stmt};
use crate::complexity::complexity_with_deadline;
use crate::error::{Error, Result};
use crate::parse::{comments_in_range, parse_module, parses_cleanly};
use crate::util::slice_lines;

/// Which gate rejected the rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailure {
    SyntaxError,
    ComplexityNotReduced,
    ComplexityTimeout,
    BehaviorChanged,
    FormattingLost,
}

impl GateFailure {
    /// Formatting failures are the only ones worth retrying with the
    /// fallback backend
    pub fn is_formatting_only(&self) -> bool {
        matches!(self, GateFailure::FormattingLost)
    }
}

impl std::fmt::Display for GateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateFailure::SyntaxError => "syntax_error",
            GateFailure::ComplexityNotReduced => "complexity_not_reduced",
            GateFailure::ComplexityTimeout => "complexity_timeout",
            GateFailure::BehaviorChanged => "behavior_changed",
            GateFailure::FormattingLost => "formatting_lost",
        };
        f.write_str(s)
    }
}

/// Outcome of one validation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub syntax_ok: bool,
    pub complexity_ok: bool,
    pub behavior_ok: bool,
    pub formatting_ok: bool,
    /// Set when any gate failed; later gates were not evaluated
    pub failure: Option<GateFailure>,
    pub diagnostics: Vec<String>,
}

impl ValidationResult {
    pub fn accepted(&self) -> bool {
        self.failure.is_none()
            && self.syntax_ok
            && self.complexity_ok
            && self.behavior_ok
            && self.formatting_ok
    }

    fn reject(mut self, gate: GateFailure, diag: String) -> Self {
        self.failure = Some(gate);
        self.diagnostics.push(diag);
        self
    }
}

/// Runs the four gates over an (original, transformed) source pair
#[derive(Debug, Clone)]
pub struct TransformValidator {
    complexity_deadline: Duration,
}

impl Default for TransformValidator {
    fn default() -> Self {
        Self {
            complexity_deadline: Duration::from_secs(30),
        }
    }
}

impl TransformValidator {
    pub fn new(complexity_deadline: Duration) -> Self {
        Self {
            complexity_deadline,
        }
    }

    /// Validate `transformed` against `original`. `old_region` is the
    /// 1-based inclusive line range the rewrite claims to have edited in
    /// the original; everything outside it must be untouched.
    pub fn validate(
        &self,
        original: &str,
        transformed: &str,
        func_name: &str,
        old_region: (usize, usize),
    ) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        // Gate 1: the rewrite must still parse
        if !parses_cleanly(transformed) {
            return Ok(result.reject(
                GateFailure::SyntaxError,
                "transformed source does not parse".to_string(),
            ));
        }
        result.syntax_ok = true;

        let orig_module = parse_module(original)?;
        let new_module = parse_module(transformed)?;
        let orig_func = orig_module
            .get_function(func_name)
            .ok_or_else(|| Error::from(format!("function `{}` not in original", func_name)))?;

        // Gate 2: complexity must strictly decrease, within the deadline
        let new_func = match new_module.get_function(func_name) {
            Some(f) => f,
            None => {
                return Ok(result.reject(
                    GateFailure::ComplexityNotReduced,
                    format!("function `{}` missing after rewrite", func_name),
                ));
            }
        };
        let deadline = Instant::now() + self.complexity_deadline;
        let before = complexity_with_deadline(orig_func, deadline);
        let after = complexity_with_deadline(new_func, deadline);
        match (before, after) {
            (Ok(b), Ok(a)) if a < b => {
                result.complexity_ok = true;
                result.diagnostics.push(format!("complexity {} -> {}", b, a));
            }
            (Ok(b), Ok(a)) => {
                return Ok(result.reject(
                    GateFailure::ComplexityNotReduced,
                    format!("complexity {} -> {}", b, a),
                ));
            }
            _ => {
                return Ok(result.reject(
                    GateFailure::ComplexityTimeout,
                    "complexity recomputation exceeded deadline".to_string(),
                ));
            }
        }

        let line_delta =
            transformed.lines().count() as isize - original.lines().count() as isize;
        let new_region = (
            old_region.0,
            (old_region.1 as isize + line_delta).max(old_region.0 as isize) as usize,
        );

        // Gate 3: structural behavior fingerprints
        if let Some(diag) = behavior_diff(
            orig_func,
            new_func,
            &orig_module,
            &new_module,
            old_region,
            new_region,
        ) {
            return Ok(result.reject(GateFailure::BehaviorChanged, diag));
        }
        result.behavior_ok = true;

        // Gate 4: comments, docstrings, f-strings, and everything outside
        // the edited region
        if let Some(diag) = formatting_diff(
            original,
            transformed,
            orig_func,
            old_region,
            new_region,
        ) {
            return Ok(result.reject(GateFailure::FormattingLost, diag));
        }
        result.formatting_ok = true;

        Ok(result)
    }
}

fn behavior_diff(
    orig_func: &FunctionDef,
    new_func: &FunctionDef,
    orig_module: &ModuleAst,
    new_module: &ModuleAst,
    old_region: (usize, usize),
    new_region: (usize, usize),
) -> Option<String> {
    if orig_func.params != new_func.params {
        return Some("parameter list changed".to_string());
    }
    if orig_func.return_annotation != new_func.return_annotation {
        return Some("return annotation changed".to_string());
    }
    if orig_func.closure_count() != new_func.closure_count() {
        return Some("nested function count changed".to_string());
    }

    let old_raises: usize = functions_in(orig_module, old_region)
        .map(|f| f.raise_count())
        .sum();
    let new_raises: usize = functions_in(new_module, new_region)
        .map(|f| f.raise_count())
        .sum();
    if new_raises < old_raises {
        return Some(format!("raise sites lost: {} -> {}", old_raises, new_raises));
    }

    if count_none_returns(&new_func.body) > 0
        && count_none_returns(&orig_func.body) == 0
        && !falls_through(orig_func)
    {
        return Some("introduced a None return where none existed".to_string());
    }
    if count_value_returns(&orig_func.body) != count_value_returns(&new_func.body) {
        return Some("value-returning statements changed".to_string());
    }

    let old_stmts: usize = functions_in(orig_module, old_region)
        .map(|f| stmt_count(&f.body))
        .sum();
    let new_stmts: usize = functions_in(new_module, new_region)
        .map(|f| stmt_count(&f.body))
        .sum();
    if new_stmts < old_stmts {
        return Some(format!("statements lost: {} -> {}", old_stmts, new_stmts));
    }

    None
}

fn formatting_diff(
    original: &str,
    transformed: &str,
    orig_func: &FunctionDef,
    old_region: (usize, usize),
    new_region: (usize, usize),
) -> Option<String> {
    let orig_lines: Vec<&str> = original.lines().collect();
    let new_lines: Vec<&str> = transformed.lines().collect();

    let prefix_old = &orig_lines[..old_region.0.saturating_sub(1).min(orig_lines.len())];
    let prefix_new = &new_lines[..new_region.0.saturating_sub(1).min(new_lines.len())];
    if prefix_old != prefix_new {
        return Some("lines before the edited region changed".to_string());
    }
    let suffix_old = &orig_lines[old_region.1.min(orig_lines.len())..];
    let suffix_new = &new_lines[new_region.1.min(new_lines.len())..];
    if suffix_old != suffix_new {
        return Some("lines after the edited region changed".to_string());
    }

    let new_text = slice_lines(transformed, new_region.0, new_region.1);

    for comment in comments_in_range(original, 0, original.len()) {
        let line = comment.span.start_line;
        if line >= old_region.0 && line <= old_region.1 && !new_text.contains(&comment.text) {
            return Some(format!("comment dropped: {}", comment.text));
        }
    }

    if let Some(doc) = orig_func.docstring_span() {
        if !new_text.contains(doc.slice(original)) {
            return Some("docstring dropped".to_string());
        }
    }

    let old_text = slice_lines(original, old_region.0, old_region.1);
    if fstring_marker_count(&old_text) != fstring_marker_count(&new_text) {
        return Some("f-string literals changed".to_string());
    }

    None
}

fn functions_in<'a>(
    module: &'a ModuleAst,
    region: (usize, usize),
) -> impl Iterator<Item = &'a FunctionDef> + 'a {
    module
        .functions
        .iter()
        .filter(move |f| f.span.start_line >= region.0 && f.span.end_line <= region.1)
}

/// Every statement node, compound headers included
fn stmt_count(stmts: &[Stmt]) -> usize {
    stmts
        .iter()
        .map(|s| {
            1 + s
                .child_blocks()
                .iter()
                .map(|b| stmt_count(b))
                .sum::<usize>()
        })
        .sum()
}

fn count_none_returns(stmts: &[Stmt]) -> usize {
    fold_stmts(stmts, &|s| match s {
        Stmt::Return { value: None, .. } => 1,
        Stmt::Return {
            value: Some(Expr::Literal { kind, .. }),
            ..
        } if *kind == LiteralKind::NoneLit => 1,
        _ => 0,
    })
}

fn count_value_returns(stmts: &[Stmt]) -> usize {
    fold_stmts(stmts, &|s| match s {
        Stmt::Return { value: Some(v), .. }
            if !matches!(
                v,
                Expr::Literal {
                    kind: LiteralKind::NoneLit,
                    ..
                }
            ) =>
        {
            1
        }
        _ => 0,
    })
}

fn fold_stmts(stmts: &[Stmt], f: &dyn Fn(&Stmt) -> usize) -> usize {
    stmts
        .iter()
        .map(|s| {
            // Nested defs are separate functions; their returns are theirs
            if matches!(s, Stmt::FunctionDef { .. }) {
                return 0;
            }
            f(s) + s
                .child_blocks()
                .iter()
                .map(|b| fold_stmts(b, f))
                .sum::<usize>()
        })
        .sum()
}

/// True when execution can run off the end of the function (implicit None)
fn falls_through(func: &FunctionDef) -> bool {
    !matches!(
        func.logic_body().last(),
        Some(Stmt::Return { .. }) | Some(Stmt::Raise { .. })
    )
}

fn fstring_marker_count(text: &str) -> usize {
    ["f\"", "f'", "F\"", "F'"]
        .iter()
        .map(|m| text.matches(m).count())
        .sum()
}
