//! Refactoring patterns — matchers for complexity-reduction opportunities
//!
//! A [`Pattern`] is a pure function over a parsed function body: it either
//! finds nothing, or produces a [`MatchResult`] describing a minimal
//! candidate edit plus an estimated complexity delta. Patterns never touch
//! source text themselves; the typed [`RewritePlan`] they emit is applied by
//! a backend.
//!
//! Patterns are registered in a [`PatternMatcher`] and tried strictly in
//! ascending priority order (lower = less invasive). A pattern facing a
//! construct it cannot safely reason about — a `match` statement, a walrus
//! binding in a condition it would rewrite, any unmodeled statement in the
//! affected region — returns `None`, which is identical to "no match".

mod decompose_conditional;
mod early_return;
mod extract_method;
mod guard_clause;

pub use decompose_conditional::DecomposeConditional;
pub use early_return::EarlyReturn;
pub use extract_method::ExtractMethod;
pub use guard_clause::GuardClause;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ast::{Expr, FunctionDef, Span, Stmt};

/// Pattern identity, ordered by invasiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternId {
    EarlyReturn,
    GuardClause,
    DecomposeConditional,
    ExtractMethod,
}

impl PatternId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternId::EarlyReturn => "early_return",
            PatternId::GuardClause => "guard_clause",
            PatternId::DecomposeConditional => "decompose_conditional",
            PatternId::ExtractMethod => "extract_method",
        }
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matched transformation opportunity.
///
/// Ephemeral: produced fresh per engine invocation, never cached across
/// files.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub pattern_id: PatternId,
    /// Region the edit will touch (the enclosing function's span)
    pub target_span: Span,
    /// How much the metric should drop if the rewrite lands
    pub estimated_delta: u32,
    pub plan: RewritePlan,
}

/// Typed description of the edit, carrying byte spans and verbatim fragments
/// from the original source so both backends can apply it independently.
#[derive(Debug, Clone)]
pub enum RewritePlan {
    /// Invert a trailing `if cond:` block into an early exit, dedenting the
    /// body one level
    EarlyReturn {
        if_span: Span,
        /// Inverted condition text for the guard line
        guard_cond: String,
        body_span: Span,
        /// Indent (spaces) of the `if` line; the body sits one level deeper
        guard_indent: usize,
        body_indent: usize,
        /// `return` at function level, `continue` inside a loop
        exit_stmt: String,
    },
    /// Hoist a leading validation `if` into a sequential early-exit guard
    GuardClause {
        if_span: Span,
        guard_cond: String,
        body_span: Span,
        guard_indent: usize,
        body_indent: usize,
        /// Exit hoisted from the `else` arm, or a bare `return`
        exit_stmt: String,
    },
    /// Split a compound boolean condition into named intermediate steps
    DecomposeConditional {
        if_span: Span,
        /// Last line of the `if` header (the one carrying the colon)
        header_end_line: usize,
        stmt_indent: usize,
        /// `(name, verbatim operand text)` in original evaluation order
        bindings: Vec<(String, String)>,
        /// Replacement condition referencing the bindings
        new_cond: String,
    },
    /// Lift a single-entry/single-exit block into a private helper
    ExtractMethod {
        block_span: Span,
        block_indent: usize,
        helper_name: String,
        /// `(name, annotation)` inputs in first-use order
        params: Vec<(String, Option<String>)>,
        /// Live-out variable the helper returns, if any
        output: Option<String>,
        func_span: Span,
        func_indent: usize,
    },
}

/// A registered, priority-ranked matcher
pub trait Pattern: Send + Sync {
    fn id(&self) -> PatternId;

    /// Lower number = less invasive, tried first
    fn priority(&self) -> u8;

    /// Pure match over the parsed function; `None` means "no opportunity"
    /// and also "construct I cannot safely reason about"
    fn match_function(&self, func: &FunctionDef, source: &str) -> Option<MatchResult>;
}

/// Ordered pattern registry
pub struct PatternMatcher {
    patterns: Vec<Box<dyn Pattern>>,
}

impl PatternMatcher {
    /// Registry with the four built-in patterns
    pub fn new() -> Self {
        let mut matcher = Self {
            patterns: Vec::new(),
        };
        matcher.register(Box::new(EarlyReturn));
        matcher.register(Box::new(GuardClause));
        matcher.register(Box::new(DecomposeConditional));
        matcher.register(Box::new(ExtractMethod));
        matcher
    }

    /// Empty registry, for callers composing their own pattern set
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Register a pattern, keeping the registry sorted by priority
    pub fn register(&mut self, pattern: Box<dyn Pattern>) {
        self.patterns.push(pattern);
        self.patterns.sort_by_key(|p| p.priority());
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Candidates in ascending priority order, produced lazily. The matcher
    /// does not stop at the first hit; every pattern gets to report so the
    /// engine can fall through when validation rejects an earlier candidate.
    pub fn candidates<'a>(
        &'a self,
        func: &'a FunctionDef,
        source: &'a str,
    ) -> impl Iterator<Item = MatchResult> + 'a {
        self.patterns.iter().filter_map(move |pattern| {
            let result = pattern.match_function(func, source);
            match &result {
                Some(m) => tracing::debug!(
                    pattern = %pattern.id(),
                    delta = m.estimated_delta,
                    "pattern matched"
                ),
                None => tracing::trace!(pattern = %pattern.id(), "no match"),
            }
            result
        })
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Shared analysis helpers
// ---------------------------------------------------------------------------

/// Count branching constructs (if/for/while/except/match) recursively
pub(crate) fn branching_count(stmts: &[Stmt]) -> usize {
    stmts
        .iter()
        .map(|s| {
            let own = match s {
                Stmt::If { .. } | Stmt::For { .. } | Stmt::While { .. } | Stmt::Match { .. } => 1,
                Stmt::Try { handlers, .. } => handlers.len(),
                _ => 0,
            };
            own + s.child_blocks().iter().map(|b| branching_count(b)).sum::<usize>()
        })
        .sum()
}

/// Whether a region contains constructs patterns must not reorganize
pub(crate) fn region_has_unmodeled(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| {
        matches!(s, Stmt::Match { .. } | Stmt::Unknown { .. })
            || s.child_blocks().iter().any(|b| region_has_unmodeled(b))
    })
}

/// Whether a region contains any early-exit statement at any depth
pub(crate) fn region_has_exits(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| {
        matches!(
            s,
            Stmt::Return { .. } | Stmt::Raise { .. } | Stmt::Break { .. } | Stmt::Continue { .. }
        ) || s.child_blocks().iter().any(|b| region_has_exits(b))
    })
}

/// Names assigned anywhere in a region (single-name targets only)
pub(crate) fn assigned_names(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } => {
                if target.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    out.insert(target.clone());
                }
            }
            Stmt::For { target, .. } => {
                if target.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    out.insert(target.clone());
                }
            }
            _ => {}
        }
        for block in stmt.child_blocks() {
            assigned_names(block, out);
        }
    }
}

/// Names read anywhere in a region
pub(crate) fn read_names(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    fn expr_names(expr: &Expr, out: &mut BTreeSet<String>) {
        match expr {
            Expr::Name { id, .. } => {
                out.insert(id.clone());
            }
            Expr::BoolOp { values, .. } => values.iter().for_each(|v| expr_names(v, out)),
            Expr::UnaryOp { operand, .. } => expr_names(operand, out),
            Expr::Compare { parts, .. } => parts.iter().for_each(|p| expr_names(p, out)),
            Expr::Call { func, args, .. } => {
                expr_names(func, out);
                args.iter().for_each(|a| expr_names(a, out));
            }
            Expr::Attribute { value, .. } => expr_names(value, out),
            Expr::Subscript { value, index, .. } => {
                expr_names(value, out);
                expr_names(index, out);
            }
            Expr::Await { operand, .. } => expr_names(operand, out),
            _ => {}
        }
    }

    for stmt in stmts {
        match stmt {
            Stmt::If { test, .. } => expr_names(test, out),
            Stmt::While { test, .. } => expr_names(test, out),
            Stmt::For { iter, .. } => expr_names(iter, out),
            Stmt::Return {
                value: Some(v), ..
            } => expr_names(v, out),
            Stmt::Raise { exc: Some(e), .. } => expr_names(e, out),
            Stmt::Assign { value, .. } => expr_names(value, out),
            Stmt::Expr { value, .. } => expr_names(value, out),
            _ => {}
        }
        for block in stmt.child_blocks() {
            read_names(block, out);
        }
    }
}

/// Whether an expression contains a walrus binding anywhere
pub(crate) fn contains_named_expr(expr: &Expr) -> bool {
    match expr {
        Expr::NamedExpr { .. } => true,
        Expr::BoolOp { values, .. } => values.iter().any(contains_named_expr),
        Expr::UnaryOp { operand, .. } => contains_named_expr(operand),
        Expr::Compare { parts, .. } => parts.iter().any(contains_named_expr),
        Expr::Call { func, args, .. } => {
            contains_named_expr(func) || args.iter().any(contains_named_expr)
        }
        Expr::Attribute { value, .. } => contains_named_expr(value),
        Expr::Subscript { value, index, .. } => {
            contains_named_expr(value) || contains_named_expr(index)
        }
        Expr::Await { operand, .. } => contains_named_expr(operand),
        _ => false,
    }
}

/// Render the logical negation of a condition.
///
/// Operator flips are limited to identity and membership tests, the only
/// comparisons Python guarantees are exact complements. Value comparisons
/// (`==`, `<`, ...) go through `__eq__`/`__lt__` and can disagree with
/// their flipped counterpart (NaN, rich comparisons), so those wrap in
/// `not (...)` instead.
pub(crate) fn invert_condition(test: &Expr, source: &str) -> String {
    let raw = test.span().slice(source);

    match test {
        // `not x` -> `x`
        Expr::UnaryOp { op, operand, .. } if op == "not" => {
            operand.span().slice(source).to_string()
        }
        Expr::Compare { parts, span } if parts.len() == 2 => {
            let left = parts[0].span();
            let right = parts[1].span();
            let op_text = source[left.end_byte..right.start_byte].trim();
            let flipped = match op_text {
                "in" => Some("not in"),
                "not in" => Some("in"),
                "is" => Some("is not"),
                "is not" => Some("is"),
                _ => None,
            };
            match flipped {
                Some(op) => format!(
                    "{} {} {}",
                    left.slice(source),
                    op,
                    right.slice(source)
                ),
                None => format!("not ({})", span.slice(source)),
            }
        }
        Expr::Name { .. } | Expr::Attribute { .. } | Expr::Call { .. } => {
            format!("not {}", raw)
        }
        _ => {
            if raw.contains(' ') {
                format!("not ({})", raw)
            } else {
                format!("not {}", raw)
            }
        }
    }
}

/// Pick a name not already used in the function (params or assignments)
pub(crate) fn fresh_name(base: &str, func: &FunctionDef) -> String {
    let mut used: BTreeSet<String> = func.params.iter().map(|p| p.name.clone()).collect();
    assigned_names(&func.body, &mut used);
    read_names(&func.body, &mut used);

    if !used.contains(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !used.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
