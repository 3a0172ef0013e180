//! AST types for Python code representation
//!
//! A lightweight, statement-level view of a Python module, parsed via
//! tree-sitter. Every node carries a [`Span`] with exact byte offsets into
//! the original source so rewrites can slice verbatim text. Constructs the
//! model does not cover survive as `Unknown` nodes — patterns must treat
//! those conservatively.

use serde::{Deserialize, Serialize};

/// Parsed module
#[derive(Debug, Clone)]
pub struct ModuleAst {
    /// Top-level functions
    pub functions: Vec<FunctionDef>,

    /// Hash of source for change detection
    pub source_hash: String,
}

/// Source location, 1-based lines plus byte offsets into the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Span {
    /// Exact source text covered by this span
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start_byte.min(source.len())..self.end_byte.min(source.len())]
    }

    /// Whether this span fully contains `other`
    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }

    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// A function definition
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// Function name
    pub name: String,

    /// Parameters, in declaration order
    pub params: Vec<Parameter>,

    /// Return annotation, verbatim (e.g. `"bool"`, `"List[int]"`)
    pub return_annotation: Option<String>,

    /// Body statements
    pub body: Vec<Stmt>,

    /// Span of the whole definition, `def` through last body line
    pub span: Span,

    /// Span of the body block only
    pub body_span: Span,

    /// Column of the `def` keyword; body statements sit one level deeper
    pub def_indent: usize,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Annotation text, verbatim
    pub annotation: Option<String>,
    /// Default value text, verbatim
    pub default: Option<String>,
}

/// A statement
#[derive(Debug, Clone)]
pub enum Stmt {
    If {
        test: Expr,
        body: Vec<Stmt>,
        /// Span of the consequence block, comments included
        body_span: Span,
        /// `elif` chains are nested `If`s inside `orelse`
        orelse: Vec<Stmt>,
        /// Span of the `elif`/`else` clause, when present
        orelse_span: Option<Span>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Raise {
        exc: Option<Expr>,
        span: Span,
    },
    Assign {
        /// Target text, verbatim (single-target assignments only; tuple
        /// targets fall back to the raw text)
        target: String,
        value: Expr,
        span: Span,
    },
    Expr {
        value: Expr,
        span: Span,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Try {
        body: Vec<Stmt>,
        /// One entry per `except` clause
        handlers: Vec<Vec<Stmt>>,
        finally: Vec<Stmt>,
        span: Span,
    },
    With {
        body: Vec<Stmt>,
        span: Span,
    },
    /// Nested function definition (closure boundary)
    FunctionDef {
        def: Box<FunctionDef>,
        span: Span,
    },
    /// `match` statement — arms are not modeled; patterns must not touch it
    Match {
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Pass {
        span: Span,
    },
    /// Unmodeled construct, kept visible so patterns can bail out
    Unknown {
        kind: String,
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::If { span, .. } => *span,
            Stmt::Return { span, .. } => *span,
            Stmt::Raise { span, .. } => *span,
            Stmt::Assign { span, .. } => *span,
            Stmt::Expr { span, .. } => *span,
            Stmt::For { span, .. } => *span,
            Stmt::While { span, .. } => *span,
            Stmt::Try { span, .. } => *span,
            Stmt::With { span, .. } => *span,
            Stmt::FunctionDef { span, .. } => *span,
            Stmt::Match { span } => *span,
            Stmt::Break { span } => *span,
            Stmt::Continue { span } => *span,
            Stmt::Pass { span } => *span,
            Stmt::Unknown { span, .. } => *span,
        }
    }

    /// Direct child statement blocks
    pub fn child_blocks(&self) -> Vec<&[Stmt]> {
        match self {
            Stmt::If { body, orelse, .. } => vec![body.as_slice(), orelse.as_slice()],
            Stmt::For { body, .. } | Stmt::While { body, .. } | Stmt::With { body, .. } => {
                vec![body.as_slice()]
            }
            Stmt::Try {
                body,
                handlers,
                finally,
                ..
            } => {
                let mut blocks = vec![body.as_slice()];
                blocks.extend(handlers.iter().map(|h| h.as_slice()));
                blocks.push(finally.as_slice());
                blocks
            }
            _ => vec![],
        }
    }
}

/// An expression
#[derive(Debug, Clone)]
pub enum Expr {
    Name {
        id: String,
        span: Span,
    },
    Literal {
        kind: LiteralKind,
        span: Span,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
        span: Span,
    },
    UnaryOp {
        op: String,
        operand: Box<Expr>,
        span: Span,
    },
    Compare {
        /// Left operand followed by each comparator
        parts: Vec<Expr>,
        span: Span,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
        span: Span,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Await {
        operand: Box<Expr>,
        span: Span,
    },
    /// Lambda body is opaque; only its presence matters (closure boundary)
    Lambda {
        span: Span,
    },
    /// Walrus assignment — conflicts with guard rewrites
    NamedExpr {
        span: Span,
    },
    Unknown {
        kind: String,
        span: Span,
    },
}

/// Literal kinds; string style is tracked so transforms cannot silently
/// convert between f-strings and plain strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralKind {
    Int,
    Float,
    Str,
    FString,
    Bool,
    NoneLit,
    /// List/dict/set/tuple display
    Collection,
    Other,
}

/// Boolean operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOpKind {
    And,
    Or,
}

impl std::fmt::Display for BoolOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoolOpKind::And => write!(f, "and"),
            BoolOpKind::Or => write!(f, "or"),
        }
    }
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::Name { span, .. } => *span,
            Expr::Literal { span, .. } => *span,
            Expr::BoolOp { span, .. } => *span,
            Expr::UnaryOp { span, .. } => *span,
            Expr::Compare { span, .. } => *span,
            Expr::Call { span, .. } => *span,
            Expr::Attribute { span, .. } => *span,
            Expr::Subscript { span, .. } => *span,
            Expr::Await { span, .. } => *span,
            Expr::Lambda { span } => *span,
            Expr::NamedExpr { span } => *span,
            Expr::Unknown { span, .. } => *span,
        }
    }

    /// Whether evaluating this expression could have observable effects.
    /// Calls, awaits, walrus bindings, and anything unmodeled count as
    /// effectful; hoisting such an operand out of a short-circuit chain
    /// would change behavior.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Expr::Name { .. } | Expr::Literal { .. } => false,
            Expr::BoolOp { values, .. } => values.iter().any(Expr::has_side_effects),
            Expr::UnaryOp { operand, .. } => operand.has_side_effects(),
            Expr::Compare { parts, .. } => parts.iter().any(Expr::has_side_effects),
            Expr::Attribute { value, .. } => value.has_side_effects(),
            Expr::Subscript { value, index, .. } => {
                value.has_side_effects() || index.has_side_effects()
            }
            Expr::Call { .. }
            | Expr::Await { .. }
            | Expr::Lambda { .. }
            | Expr::NamedExpr { .. }
            | Expr::Unknown { .. } => true,
        }
    }

    /// Count `and`/`or` operators in this expression
    pub fn bool_op_count(&self) -> usize {
        match self {
            Expr::BoolOp { values, .. } => {
                values.len().saturating_sub(1)
                    + values.iter().map(Expr::bool_op_count).sum::<usize>()
            }
            Expr::UnaryOp { operand, .. } => operand.bool_op_count(),
            Expr::Compare { parts, .. } => parts.iter().map(Expr::bool_op_count).sum(),
            Expr::Call { args, .. } => args.iter().map(Expr::bool_op_count).sum(),
            _ => 0,
        }
    }
}

impl FunctionDef {
    /// Docstring statement, if the body opens with a string literal
    pub fn docstring_span(&self) -> Option<Span> {
        match self.body.first() {
            Some(Stmt::Expr {
                value:
                    Expr::Literal {
                        kind: LiteralKind::Str | LiteralKind::FString,
                        span,
                    },
                ..
            }) => Some(*span),
            _ => None,
        }
    }

    /// Body statements excluding a leading docstring
    pub fn logic_body(&self) -> &[Stmt] {
        if self.docstring_span().is_some() {
            &self.body[1..]
        } else {
            &self.body
        }
    }

    /// Count `raise` statements anywhere in the body
    pub fn raise_count(&self) -> usize {
        fn count(stmts: &[Stmt]) -> usize {
            stmts
                .iter()
                .map(|s| {
                    let own = usize::from(matches!(s, Stmt::Raise { .. }));
                    own + s.child_blocks().iter().map(|b| count(b)).sum::<usize>()
                })
                .sum()
        }
        count(&self.body)
    }

    /// Count nested `def`s and lambdas (closure boundaries)
    pub fn closure_count(&self) -> usize {
        fn count_stmts(stmts: &[Stmt]) -> usize {
            stmts
                .iter()
                .map(|s| match s {
                    Stmt::FunctionDef { .. } => 1,
                    Stmt::Expr { value, .. } => count_expr(value),
                    Stmt::Assign { value, .. } => count_expr(value),
                    Stmt::Return {
                        value: Some(v), ..
                    } => count_expr(v),
                    other => other.child_blocks().iter().map(|b| count_stmts(b)).sum(),
                })
                .sum()
        }
        fn count_expr(expr: &Expr) -> usize {
            match expr {
                Expr::Lambda { .. } => 1,
                Expr::BoolOp { values, .. } => values.iter().map(count_expr).sum(),
                Expr::UnaryOp { operand, .. } => count_expr(operand),
                Expr::Compare { parts, .. } => parts.iter().map(count_expr).sum(),
                Expr::Call { func, args, .. } => {
                    count_expr(func) + args.iter().map(count_expr).sum::<usize>()
                }
                Expr::Attribute { value, .. } => count_expr(value),
                Expr::Subscript { value, index, .. } => count_expr(value) + count_expr(index),
                Expr::Await { operand, .. } => count_expr(operand),
                _ => 0,
            }
        }
        count_stmts(&self.body)
    }

    /// Whether any statement in the body (recursively) is one the model
    /// does not cover
    pub fn has_unknown_stmts(&self) -> bool {
        fn check(stmts: &[Stmt]) -> bool {
            stmts.iter().any(|s| {
                matches!(s, Stmt::Unknown { .. })
                    || s.child_blocks().iter().any(|b| check(b))
            })
        }
        check(&self.body)
    }
}

impl ModuleAst {
    /// Find function by name
    pub fn get_function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Find the function whose span covers the given 1-based line
    pub fn function_at_line(&self, line: usize) -> Option<&FunctionDef> {
        self.functions
            .iter()
            .find(|f| f.span.start_line <= line && line <= f.span.end_line)
    }

    /// Get all function names
    pub fn function_names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name.as_str()).collect()
    }
}
