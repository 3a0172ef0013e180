//! Transformation backends — the surgeons that apply a matched plan
//!
//! Two strategies with one contract: `apply(original, match)` returns the
//! full transformed source or a typed [`Error::TransformFailed`], never
//! malformed output. Both always receive the pristine original — the engine
//! passes it explicitly on every attempt, so a fallback retry can never see
//! the primary's output.
//!
//! [`TreeBackend`] (primary) re-serializes the edited function from its
//! statement structure: predictable, canonical layout, at the cost of
//! dropping comment and blank lines that sit between the function's
//! top-level statements. [`LineBackend`] (fallback) splices whole lines
//! into the original line array and touches nothing else, so every comment
//! outside the minimal edit survives byte-exact. The validator's formatting
//! gate is what arbitrates between them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parse::parse_module;
use crate::patterns::{MatchResult, RewritePlan};
use crate::util::{shift_indent, slice_lines};

/// Backend identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    Tree,
    Line,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Tree => "tree",
            BackendId::Line => "line",
        }
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transformation strategy
pub trait Backend: Send + Sync {
    fn id(&self) -> BackendId;

    /// Apply the matched plan to the pristine original source, returning
    /// the full transformed source
    fn apply(&self, original: &str, m: &MatchResult) -> Result<String>;
}

/// Primary structural rewriter
pub struct TreeBackend;

impl Backend for TreeBackend {
    fn id(&self) -> BackendId {
        BackendId::Tree
    }

    fn apply(&self, original: &str, m: &MatchResult) -> Result<String> {
        let spliced = splice(original, &m.plan, self.id())?;
        normalize_function_region(&spliced, m.target_span.start_line, self.id())
    }
}

/// Fallback format-literal rewriter
pub struct LineBackend;

impl Backend for LineBackend {
    fn id(&self) -> BackendId {
        BackendId::Line
    }

    fn apply(&self, original: &str, m: &MatchResult) -> Result<String> {
        splice(original, &m.plan, self.id())
    }
}

/// Minimal whole-line splice shared by both strategies
fn splice(original: &str, plan: &RewritePlan, backend: BackendId) -> Result<String> {
    let lines: Vec<&str> = original.lines().collect();
    let fail = |reason: &str| Error::TransformFailed {
        backend,
        reason: reason.to_string(),
    };

    let new_lines: Vec<String> = match plan {
        RewritePlan::EarlyReturn {
            if_span,
            guard_cond,
            body_span,
            guard_indent,
            body_indent,
            exit_stmt,
        }
        | RewritePlan::GuardClause {
            if_span,
            guard_cond,
            body_span,
            guard_indent,
            body_indent,
            exit_stmt,
        } => {
            if *body_indent <= *guard_indent {
                return Err(fail("body not indented past guard"));
            }
            let unit = body_indent - guard_indent;
            let indent = " ".repeat(*guard_indent);
            let exit_indent = " ".repeat(*body_indent);

            let mut out: Vec<String> =
                lines[..if_span.start_line - 1].iter().map(|l| l.to_string()).collect();
            out.push(format!("{}if {}:", indent, guard_cond));
            out.push(format!("{}{}", exit_indent, exit_stmt));
            let body_text = slice_lines(original, body_span.start_line, body_span.end_line);
            out.extend(
                shift_indent(&body_text, -(unit as isize))
                    .lines()
                    .map(|l| l.to_string()),
            );
            out.extend(lines[if_span.end_line..].iter().map(|l| l.to_string()));
            out
        }

        RewritePlan::DecomposeConditional {
            if_span,
            header_end_line,
            stmt_indent,
            bindings,
            new_cond,
        } => {
            if *header_end_line < if_span.start_line {
                return Err(fail("if header has no line of its own"));
            }
            let indent = " ".repeat(*stmt_indent);
            let mut out: Vec<String> =
                lines[..if_span.start_line - 1].iter().map(|l| l.to_string()).collect();
            for (name, text) in bindings {
                out.push(format!("{}{} = {}", indent, name, text));
            }
            out.push(format!("{}if {}:", indent, new_cond));
            out.extend(lines[*header_end_line..].iter().map(|l| l.to_string()));
            out
        }

        RewritePlan::ExtractMethod {
            block_span,
            block_indent,
            helper_name,
            params,
            output,
            func_span,
            func_indent,
        } => {
            if *block_indent <= *func_indent {
                return Err(fail("block not indented past def"));
            }
            let unit = block_indent - func_indent;
            let call_args: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
            let call = match output {
                Some(name) => format!(
                    "{}{} = {}({})",
                    " ".repeat(*block_indent),
                    name,
                    helper_name,
                    call_args.join(", ")
                ),
                None => format!(
                    "{}{}({})",
                    " ".repeat(*block_indent),
                    helper_name,
                    call_args.join(", ")
                ),
            };

            let sig: Vec<String> = params
                .iter()
                .map(|(n, ann)| match ann {
                    Some(a) => format!("{}: {}", n, a),
                    None => n.clone(),
                })
                .collect();

            let mut out: Vec<String> =
                lines[..block_span.start_line - 1].iter().map(|l| l.to_string()).collect();
            out.push(call);
            out.extend(
                lines[block_span.end_line..func_span.end_line]
                    .iter()
                    .map(|l| l.to_string()),
            );

            // Helper goes right after the function, inside the edited region
            out.push(String::new());
            out.push(String::new());
            out.push(format!(
                "{}def {}({}):",
                " ".repeat(*func_indent),
                helper_name,
                sig.join(", ")
            ));
            let block_text = slice_lines(original, block_span.start_line, block_span.end_line);
            let target_indent = (*func_indent + unit) as isize - *block_indent as isize;
            out.extend(
                shift_indent(&block_text, target_indent)
                    .lines()
                    .map(|l| l.to_string()),
            );
            if let Some(name) = output {
                out.push(format!("{}return {}", " ".repeat(func_indent + unit), name));
            }
            out.extend(lines[func_span.end_line..].iter().map(|l| l.to_string()));
            out
        }
    };

    let mut result = new_lines.join("\n");
    if original.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}

/// Re-serialize the edited function from its statement structure: header
/// and statement lines survive, free-floating comment and blank lines
/// between top-level statements do not
fn normalize_function_region(
    spliced: &str,
    func_start_line: usize,
    backend: BackendId,
) -> Result<String> {
    let module = parse_module(spliced)?;
    let func = module
        .functions
        .iter()
        .find(|f| f.span.start_line == func_start_line)
        .ok_or_else(|| Error::TransformFailed {
            backend,
            reason: "edited function lost after rewrite".to_string(),
        })?;

    let header_end = func
        .body
        .first()
        .map(|s| s.span().start_line.saturating_sub(1))
        .unwrap_or(func.span.end_line);

    let keep_in_region = |line: usize| -> bool {
        if line <= header_end {
            return true;
        }
        func.body
            .iter()
            .any(|s| s.span().start_line <= line && line <= s.span().end_line)
    };

    let kept: Vec<&str> = spliced
        .lines()
        .enumerate()
        .filter(|(idx, _)| {
            let line = idx + 1;
            if line < func.span.start_line || line > func.span.end_line {
                true
            } else {
                keep_in_region(line)
            }
        })
        .map(|(_, l)| l)
        .collect();

    let mut result = kept.join("\n");
    if spliced.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{GuardClause, Pattern, PatternMatcher};
    use pretty_assertions::assert_eq;

    fn first_match(source: &str) -> MatchResult {
        let module = parse_module(source).unwrap();
        let m = PatternMatcher::new()
            .candidates(&module.functions[0], source)
            .next()
            .expect("expected a candidate");
        m
    }

    #[test]
    fn test_line_backend_early_return() {
        let source = "def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
";
        let m = first_match(source);
        let out = LineBackend.apply(source, &m).unwrap();
        let expected = "def process(items):
    if not items:
        return
    for item in items:
        if item:
            handle(item)
";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_line_backend_guard_clause_hoists_else() {
        let source = "def handle(req):
    if req.valid:
        if req.size:
            process(req)
        log(req)
    else:
        return None
    return True
";
        let module = parse_module(source).unwrap();
        let m = GuardClause
            .match_function(&module.functions[0], source)
            .unwrap();
        let out = LineBackend.apply(source, &m).unwrap();
        let expected = "def handle(req):
    if not req.valid:
        return None
    if req.size:
        process(req)
    log(req)
    return True
";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_line_backend_preserves_comments_in_body() {
        let source = "def process(items):
    if items:
        # important note
        for item in items:
            if item:
                handle(item)
";
        let m = first_match(source);
        let out = LineBackend.apply(source, &m).unwrap();
        assert!(out.contains("# important note"));
    }

    #[test]
    fn test_tree_backend_drops_comment_between_statements() {
        let source = "def process(items):
    total = 0
    # running tally
    if items:
        if total == 0:
            total = scan(items)
    return total
";
        let normalized = normalize_function_region(source, 1, BackendId::Tree).unwrap();
        assert!(!normalized.contains("# running tally"));
        assert!(normalized.contains("total = 0"));
        assert!(normalized.contains("return total"));
    }

    #[test]
    fn test_backends_deterministic() {
        let source = "def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
";
        let m = first_match(source);
        let a = TreeBackend.apply(source, &m).unwrap();
        let b = TreeBackend.apply(source, &m).unwrap();
        assert_eq!(a, b);
        let c = LineBackend.apply(source, &m).unwrap();
        let d = LineBackend.apply(source, &m).unwrap();
        assert_eq!(c, d);
    }
}
