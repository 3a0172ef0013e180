//! Python parsing via tree-sitter
//!
//! Parses source into the statement-level AST in [`crate::ast`]. Parsing
//! happens once per engine invocation; nothing here is cached across calls.

use crate::ast::*;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use tree_sitter::{Node, Parser};

/// A comment found in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub span: Span,
}

/// Parse a Python module into a [`ModuleAst`]
pub fn parse_module(source: &str) -> Result<ModuleAst> {
    let tree = parse_tree(source)?;
    let root = tree.root_node();

    let mut functions = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() == "function_definition" {
            if let Some(func) = parse_function(child, source) {
                functions.push(func);
            }
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let source_hash = format!("sha256:{}", hex::encode(&hasher.finalize()[..8]));

    Ok(ModuleAst {
        functions,
        source_hash,
    })
}

/// Whether the source parses without any syntax errors.
///
/// This is the Gate 1 primitive: tree-sitter always produces a tree, so
/// "parses" here means zero ERROR or MISSING nodes anywhere in it.
pub fn parses_cleanly(source: &str) -> bool {
    match parse_tree(source) {
        Ok(tree) => !tree.root_node().has_error(),
        Err(_) => false,
    }
}

/// Collect all comments whose span intersects `[start_byte, end_byte)`
pub fn comments_in_range(source: &str, start_byte: usize, end_byte: usize) -> Vec<Comment> {
    let tree = match parse_tree(source) {
        Ok(t) => t,
        Err(_) => return Vec::new(),
    };
    let mut comments = Vec::new();
    collect_comments(tree.root_node(), source, start_byte, end_byte, &mut comments);
    comments
}

fn collect_comments(
    node: Node,
    source: &str,
    start_byte: usize,
    end_byte: usize,
    out: &mut Vec<Comment>,
) {
    if node.end_byte() <= start_byte || node.start_byte() >= end_byte {
        return;
    }
    if node.kind() == "comment" {
        out.push(Comment {
            text: node.utf8_text(source.as_bytes()).unwrap_or("").to_string(),
            span: node_span(node),
        });
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_comments(child, source, start_byte, end_byte, out);
    }
}

fn parse_tree(source: &str) -> Result<tree_sitter::Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| Error::Parse(format!("Failed to set language: {}", e)))?;
    parser
        .parse(source, None)
        .ok_or_else(|| Error::Parse("Failed to parse source".into()))
}

fn node_span(node: Node) -> Span {
    let end = node.end_position();
    // A node ending at column 0 stops exactly at a line boundary
    let end_line = if end.column == 0 && end.row > 0 {
        end.row
    } else {
        end.row + 1
    };
    Span {
        start_line: node.start_position().row + 1,
        end_line,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
    }
}

fn text(node: Node, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or("").to_string()
}

fn parse_function(node: Node, source: &str) -> Option<FunctionDef> {
    let name = node.child_by_field_name("name").map(|n| text(n, source))?;
    let params = node
        .child_by_field_name("parameters")
        .map(|p| parse_parameters(p, source))
        .unwrap_or_default();
    let return_annotation = node
        .child_by_field_name("return_type")
        .map(|n| text(n, source));
    let body_node = node.child_by_field_name("body")?;
    let body = parse_block(body_node, source);

    Some(FunctionDef {
        name,
        params,
        return_annotation,
        body,
        span: node_span(node),
        body_span: node_span(body_node),
        def_indent: node.start_position().column,
    })
}

fn parse_parameters(node: Node, source: &str) -> Vec<Parameter> {
    let mut params = Vec::new();
    let mut cursor = node.walk();

    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" => params.push(Parameter {
                name: text(child, source),
                annotation: None,
                default: None,
            }),
            "typed_parameter" => {
                let name = child
                    .child(0)
                    .filter(|c| c.kind() == "identifier")
                    .map(|c| text(c, source))
                    .unwrap_or_default();
                let annotation = child.child_by_field_name("type").map(|t| text(t, source));
                if !name.is_empty() {
                    params.push(Parameter {
                        name,
                        annotation,
                        default: None,
                    });
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| text(n, source))
                    .unwrap_or_default();
                let annotation = child.child_by_field_name("type").map(|t| text(t, source));
                let default = child.child_by_field_name("value").map(|v| text(v, source));
                if !name.is_empty() {
                    params.push(Parameter {
                        name,
                        annotation,
                        default,
                    });
                }
            }
            _ => {}
        }
    }

    params
}

fn parse_block(node: Node, source: &str) -> Vec<Stmt> {
    let mut statements = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "comment" {
            continue;
        }
        statements.push(parse_stmt(child, source));
    }
    statements
}

fn parse_stmt(node: Node, source: &str) -> Stmt {
    let span = node_span(node);
    match node.kind() {
        "if_statement" => parse_if(node, source),
        "return_statement" => {
            let value = last_expr_child(node, source, &["return"]);
            Stmt::Return { value, span }
        }
        "raise_statement" => {
            let exc = last_expr_child(node, source, &["raise", "from"]);
            Stmt::Raise { exc, span }
        }
        "expression_statement" => match node.child(0) {
            Some(inner) if inner.kind() == "assignment" => parse_assignment(inner, source, span),
            Some(inner) if inner.kind() == "augmented_assignment" => {
                // Model as an assignment to the same target
                parse_assignment(inner, source, span)
            }
            Some(inner) => Stmt::Expr {
                value: parse_expr(inner, source),
                span,
            },
            None => Stmt::Unknown {
                kind: "empty_expression_statement".into(),
                span,
            },
        },
        "for_statement" => {
            let target = node
                .child_by_field_name("left")
                .map(|n| text(n, source))
                .unwrap_or_default();
            let iter = node
                .child_by_field_name("right")
                .map(|n| parse_expr(n, source))
                .unwrap_or(Expr::Unknown {
                    kind: "missing_iter".into(),
                    span,
                });
            let body = node
                .child_by_field_name("body")
                .map(|b| parse_block(b, source))
                .unwrap_or_default();
            Stmt::For {
                target,
                iter,
                body,
                span,
            }
        }
        "while_statement" => {
            let test = node
                .child_by_field_name("condition")
                .map(|n| parse_expr(n, source))
                .unwrap_or(Expr::Unknown {
                    kind: "missing_condition".into(),
                    span,
                });
            let body = node
                .child_by_field_name("body")
                .map(|b| parse_block(b, source))
                .unwrap_or_default();
            Stmt::While { test, body, span }
        }
        "try_statement" => {
            let body = node
                .child_by_field_name("body")
                .map(|b| parse_block(b, source))
                .unwrap_or_default();
            let mut handlers = Vec::new();
            let mut finally = Vec::new();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "except_clause" => {
                        let mut hc = child.walk();
                        for except_child in child.children(&mut hc) {
                            if except_child.kind() == "block" {
                                handlers.push(parse_block(except_child, source));
                            }
                        }
                    }
                    "finally_clause" => {
                        let mut fc = child.walk();
                        for fin_child in child.children(&mut fc) {
                            if fin_child.kind() == "block" {
                                finally = parse_block(fin_child, source);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Stmt::Try {
                body,
                handlers,
                finally,
                span,
            }
        }
        "with_statement" => {
            let body = node
                .child_by_field_name("body")
                .map(|b| parse_block(b, source))
                .unwrap_or_default();
            Stmt::With { body, span }
        }
        "function_definition" => match parse_function(node, source) {
            Some(def) => Stmt::FunctionDef {
                def: Box::new(def),
                span,
            },
            None => Stmt::Unknown {
                kind: "function_definition".into(),
                span,
            },
        },
        "match_statement" => Stmt::Match { span },
        "break_statement" => Stmt::Break { span },
        "continue_statement" => Stmt::Continue { span },
        "pass_statement" => Stmt::Pass { span },
        other => Stmt::Unknown {
            kind: other.to_string(),
            span,
        },
    }
}

/// Last named child that is not one of the given keywords, as an expression
fn last_expr_child(node: Node, source: &str, keywords: &[&str]) -> Option<Expr> {
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .rev()
        .find(|c| !keywords.contains(&c.kind()) && c.kind() != "comment")
        .map(|c| parse_expr(c, source))
}

fn parse_assignment(node: Node, source: &str, span: Span) -> Stmt {
    let target = node
        .child_by_field_name("left")
        .map(|n| text(n, source))
        .unwrap_or_default();
    let value = node
        .child_by_field_name("right")
        .map(|n| parse_expr(n, source))
        .unwrap_or(Expr::Unknown {
            kind: "missing_value".into(),
            span,
        });
    Stmt::Assign {
        target,
        value,
        span,
    }
}

fn parse_if(node: Node, source: &str) -> Stmt {
    let span = node_span(node);
    let test = node
        .child_by_field_name("condition")
        .map(|n| parse_expr(n, source))
        .unwrap_or(Expr::Unknown {
            kind: "missing_condition".into(),
            span,
        });
    let consequence = node.child_by_field_name("consequence");
    let body = consequence
        .map(|b| parse_block(b, source))
        .unwrap_or_default();
    let body_span = consequence.map(node_span).unwrap_or(span);

    // elif chains become nested Ifs in orelse, matching Python's own AST
    let mut orelse = Vec::new();
    let mut orelse_span = None;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "elif_clause" => {
                let elif_span = node_span(child);
                if orelse_span.is_none() {
                    orelse_span = Some(elif_span);
                }
                let elif_test = child
                    .child_by_field_name("condition")
                    .map(|n| parse_expr(n, source))
                    .unwrap_or(Expr::Unknown {
                        kind: "missing_condition".into(),
                        span: elif_span,
                    });
                let elif_consequence = child.child_by_field_name("consequence");
                let elif_body = elif_consequence
                    .map(|b| parse_block(b, source))
                    .unwrap_or_default();
                orelse.push(Stmt::If {
                    test: elif_test,
                    body: elif_body,
                    body_span: elif_consequence.map(node_span).unwrap_or(elif_span),
                    orelse: Vec::new(),
                    orelse_span: None,
                    span: elif_span,
                });
            }
            "else_clause" => {
                if orelse_span.is_none() {
                    orelse_span = Some(node_span(child));
                }
                if let Some(block) = child.child_by_field_name("body") {
                    let block_stmts = parse_block(block, source);
                    // Attach to the innermost elif if one exists
                    if let Some(Stmt::If { orelse: inner, .. }) = orelse.last_mut() {
                        *inner = block_stmts;
                    } else {
                        orelse = block_stmts;
                    }
                }
            }
            _ => {}
        }
    }

    Stmt::If {
        test,
        body,
        body_span,
        orelse,
        orelse_span,
        span,
    }
}

fn parse_expr(node: Node, source: &str) -> Expr {
    let span = node_span(node);
    match node.kind() {
        "identifier" => Expr::Name {
            id: text(node, source),
            span,
        },
        "integer" => Expr::Literal {
            kind: LiteralKind::Int,
            span,
        },
        "float" => Expr::Literal {
            kind: LiteralKind::Float,
            span,
        },
        "string" | "concatenated_string" => {
            let raw = span.slice(source);
            let prefix: String = raw.chars().take_while(|c| *c != '"' && *c != '\'').collect();
            let kind = if prefix.to_ascii_lowercase().contains('f') {
                LiteralKind::FString
            } else {
                LiteralKind::Str
            };
            Expr::Literal { kind, span }
        }
        "true" | "false" => Expr::Literal {
            kind: LiteralKind::Bool,
            span,
        },
        "none" => Expr::Literal {
            kind: LiteralKind::NoneLit,
            span,
        },
        "list" | "dictionary" | "set" | "tuple" | "list_comprehension" | "dictionary_comprehension"
        | "set_comprehension" | "generator_expression" => Expr::Literal {
            kind: LiteralKind::Collection,
            span,
        },
        "boolean_operator" => parse_bool_op(node, source),
        "not_operator" => {
            let operand = node
                .child_by_field_name("argument")
                .map(|n| parse_expr(n, source))
                .unwrap_or(Expr::Unknown {
                    kind: "missing_operand".into(),
                    span,
                });
            Expr::UnaryOp {
                op: "not".into(),
                operand: Box::new(operand),
                span,
            }
        }
        "unary_operator" => {
            let op = node
                .child_by_field_name("operator")
                .map(|n| text(n, source))
                .unwrap_or_default();
            let operand = node
                .child_by_field_name("argument")
                .map(|n| parse_expr(n, source))
                .unwrap_or(Expr::Unknown {
                    kind: "missing_operand".into(),
                    span,
                });
            Expr::UnaryOp {
                op,
                operand: Box::new(operand),
                span,
            }
        }
        "comparison_operator" => {
            let mut parts = Vec::new();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.is_named() {
                    parts.push(parse_expr(child, source));
                }
            }
            Expr::Compare { parts, span }
        }
        "call" => {
            let func = node
                .child_by_field_name("function")
                .map(|n| parse_expr(n, source))
                .unwrap_or(Expr::Unknown {
                    kind: "missing_function".into(),
                    span,
                });
            let mut args = Vec::new();
            if let Some(arg_list) = node.child_by_field_name("arguments") {
                let mut cursor = arg_list.walk();
                for child in arg_list.children(&mut cursor) {
                    if child.is_named() && child.kind() != "comment" {
                        args.push(parse_expr(child, source));
                    }
                }
            }
            Expr::Call {
                func: Box::new(func),
                args,
                span,
            }
        }
        "attribute" => {
            let value = node
                .child_by_field_name("object")
                .map(|n| parse_expr(n, source))
                .unwrap_or(Expr::Unknown {
                    kind: "missing_object".into(),
                    span,
                });
            let attr = node
                .child_by_field_name("attribute")
                .map(|n| text(n, source))
                .unwrap_or_default();
            Expr::Attribute {
                value: Box::new(value),
                attr,
                span,
            }
        }
        "subscript" => {
            let value = node
                .child_by_field_name("value")
                .map(|n| parse_expr(n, source))
                .unwrap_or(Expr::Unknown {
                    kind: "missing_value".into(),
                    span,
                });
            let index = node
                .child_by_field_name("subscript")
                .map(|n| parse_expr(n, source))
                .unwrap_or(Expr::Unknown {
                    kind: "missing_subscript".into(),
                    span,
                });
            Expr::Subscript {
                value: Box::new(value),
                index: Box::new(index),
                span,
            }
        }
        "await" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() != "await" {
                    return Expr::Await {
                        operand: Box::new(parse_expr(child, source)),
                        span,
                    };
                }
            }
            Expr::Unknown {
                kind: "await_empty".into(),
                span,
            }
        }
        "lambda" => Expr::Lambda { span },
        "named_expression" => Expr::NamedExpr { span },
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.is_named() && child.kind() != "comment" {
                    return parse_expr(child, source);
                }
            }
            Expr::Unknown {
                kind: "empty_parens".into(),
                span,
            }
        }
        other => Expr::Unknown {
            kind: other.to_string(),
            span,
        },
    }
}

/// Flatten same-operator chains: `a and b and c` is one BoolOp with three
/// values, so short-circuit order is the vector order
fn parse_bool_op(node: Node, source: &str) -> Expr {
    let span = node_span(node);
    let op = match node
        .child_by_field_name("operator")
        .map(|n| n.kind().to_string())
        .unwrap_or_default()
        .as_str()
    {
        "or" => BoolOpKind::Or,
        _ => BoolOpKind::And,
    };

    let left = node.child_by_field_name("left").map(|n| parse_expr(n, source));
    let right = node
        .child_by_field_name("right")
        .map(|n| parse_expr(n, source));

    let mut values = Vec::new();
    for side in [left, right].into_iter().flatten() {
        match side {
            Expr::BoolOp {
                op: inner_op,
                values: inner,
                ..
            } if inner_op == op => values.extend(inner),
            other => values.push(other),
        }
    }

    Expr::BoolOp { op, values, span }
}
