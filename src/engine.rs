//! Transformation engine — pattern loop, backend escalation, validation
//!
//! One issue in, at most one accepted edit out. The engine walks the
//! pattern registry in priority order; for each candidate it applies the
//! primary backend to the pristine original and validates the result. A
//! formatting-only rejection, or the primary failing to apply the plan at
//! all, escalates to the fallback backend — again from the pristine
//! original, never from the primary's output. Any other rejection abandons
//! the candidate and moves to the next pattern. When every candidate is
//! exhausted the engine reports `None`: the issue stands, nothing was
//! touched.
//!
//! No (pattern, backend) pair is ever tried twice for one issue, and match
//! results are produced fresh per invocation and discarded with it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendId, LineBackend, TreeBackend};
use crate::error::{Error, Result};
use crate::lock::{FileBackup, LockArena};
use crate::parse::{parse_module, parses_cleanly};
use crate::patterns::{MatchResult, PatternId, PatternMatcher};
use crate::util::slice_lines;
use crate::validate::{GateFailure, TransformValidator, ValidationResult};

/// A flagged complexity violation, as reported by an upstream analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub file_path: String,
    /// 1-based inclusive line range of the offending function
    pub line_range: (usize, usize),
    pub issue_type: String,
    pub current_complexity: u32,
}

/// An accepted, validated minimal edit.
///
/// `old_code` is the verbatim source text at `line_range`; applying the
/// edit means replacing exactly those lines with `new_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSpec {
    pub line_range: (usize, usize),
    pub old_code: String,
    pub new_code: String,
    /// Which pattern produced the edit
    pub reason: String,
}

/// One (pattern, backend) attempt and how it ended
#[derive(Debug, Clone, Serialize)]
pub struct TransformAttempt {
    pub pattern: PatternId,
    pub backend: BackendId,
    /// Pristine input the backend was handed; always the caller's source,
    /// never another backend's output
    pub original_code: String,
    /// Backend output, when the plan applied at all
    pub transformed_code: Option<String>,
    /// Gate results with diagnostics; absent when the backend itself failed
    pub validation: Option<ValidationResult>,
    pub accepted: bool,
    pub failure: Option<GateFailure>,
}

/// Attempt ledger for one engine invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformMetrics {
    pub candidates_seen: u32,
    pub attempts: Vec<TransformAttempt>,
}

impl TransformMetrics {
    fn record(
        &mut self,
        pattern: PatternId,
        backend: BackendId,
        original: &str,
        transformed: Option<&str>,
        validation: Option<ValidationResult>,
    ) {
        let accepted = validation.as_ref().is_some_and(|v| v.accepted());
        let failure = validation.as_ref().and_then(|v| v.failure);
        self.attempts.push(TransformAttempt {
            pattern,
            backend,
            original_code: original.to_string(),
            transformed_code: transformed.map(|s| s.to_string()),
            validation,
            accepted,
            failure,
        });
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Human-readable attempt summary
    pub fn to_report(&self) -> String {
        let mut out = format!("candidates: {}\n", self.candidates_seen);
        for a in &self.attempts {
            let end = match (a.accepted, a.failure) {
                (true, _) => "accepted".to_string(),
                (false, Some(f)) => format!("rejected ({})", f),
                (false, None) => "backend failed".to_string(),
            };
            out.push_str(&format!("  {} via {}: {}\n", a.pattern, a.backend, end));
        }
        out
    }
}

/// Result of one engine invocation: the edit (if any) plus the ledger
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub change: Option<ChangeSpec>,
    pub metrics: TransformMetrics,
}

/// Cooperative cancellation flag, checked at the top of the pattern loop
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock limit for recomputing complexity during validation
    pub complexity_deadline: Duration,
    /// Escalate recoverable primary rejections to the fallback backend
    pub enable_fallback_backend: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            complexity_deadline: Duration::from_secs(30),
            enable_fallback_backend: true,
        }
    }
}

enum AttemptEnd {
    Accepted(ChangeSpec),
    /// The other backend may still recover: the plan failed to apply, or
    /// only the formatting gate objected
    Retryable,
    Rejected,
}

pub struct TransformEngine {
    matcher: PatternMatcher,
    primary: Box<dyn Backend>,
    fallback: Box<dyn Backend>,
    validator: TransformValidator,
    config: EngineConfig,
    locks: LockArena,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_backends(Box::new(TreeBackend), Box::new(LineBackend), config)
    }

    /// Full injection point: custom backends alongside the built-in
    /// patterns and validator
    pub fn with_backends(
        primary: Box<dyn Backend>,
        fallback: Box<dyn Backend>,
        config: EngineConfig,
    ) -> Self {
        Self {
            matcher: PatternMatcher::new(),
            primary,
            fallback,
            validator: TransformValidator::new(config.complexity_deadline),
            config,
            locks: LockArena::new(),
        }
    }

    /// Try to produce one validated edit for `issue` against `source`.
    /// `Ok(None)` means every candidate was tried and rejected; the source
    /// is left for a human.
    pub fn transform(&self, issue: &Issue, source: &str) -> Result<Option<ChangeSpec>> {
        let outcome = self.transform_with_cancel(issue, source, &CancelToken::new())?;
        Ok(outcome.change)
    }

    /// Same as [`transform`](Self::transform), with cancellation and the
    /// full attempt ledger
    pub fn transform_with_cancel(
        &self,
        issue: &Issue,
        source: &str,
        cancel: &CancelToken,
    ) -> Result<TransformOutcome> {
        let mut outcome = TransformOutcome::default();

        // Splicing is \n-based; a CRLF file would come back with rewritten
        // line endings and a non-verbatim old_code
        if source.contains('\r') {
            tracing::warn!(
                file = %issue.file_path,
                "carriage returns in source, skipping"
            );
            return Ok(outcome);
        }
        // Broken input cannot be transformed, only reported back as-is
        if !parses_cleanly(source) {
            tracing::warn!(file = %issue.file_path, "source does not parse, skipping");
            return Ok(outcome);
        }
        let module = parse_module(source)?;
        let func = match module.function_at_line(issue.line_range.0) {
            Some(f) => f,
            None => {
                tracing::debug!(
                    file = %issue.file_path,
                    line = issue.line_range.0,
                    "no function at flagged line"
                );
                return Ok(outcome);
            }
        };
        let func_name = func.name.clone();

        for m in self.matcher.candidates(func, source) {
            if cancel.is_cancelled() {
                tracing::debug!(file = %issue.file_path, "transform cancelled");
                break;
            }
            outcome.metrics.candidates_seen += 1;

            match self.attempt(&*self.primary, source, &m, &func_name, &mut outcome.metrics)? {
                AttemptEnd::Accepted(change) => {
                    outcome.change = Some(change);
                    return Ok(outcome);
                }
                AttemptEnd::Retryable if self.config.enable_fallback_backend => {
                    tracing::debug!(
                        pattern = %m.pattern_id,
                        "primary rejected, escalating to fallback backend"
                    );
                    if let AttemptEnd::Accepted(change) = self.attempt(
                        &*self.fallback,
                        source,
                        &m,
                        &func_name,
                        &mut outcome.metrics,
                    )? {
                        outcome.change = Some(change);
                        return Ok(outcome);
                    }
                }
                AttemptEnd::Retryable | AttemptEnd::Rejected => {}
            }
        }

        tracing::info!(
            file = %issue.file_path,
            attempts = outcome.metrics.attempt_count(),
            "no acceptable transform"
        );
        Ok(outcome)
    }

    /// Locked, snapshot-guarded variant reading `issue.file_path` from
    /// disk. The file is restored byte-identical on exit in all cases; the
    /// engine proposes edits, it does not land them.
    pub fn transform_file(&self, issue: &Issue) -> Result<Option<ChangeSpec>> {
        let path = Path::new(&issue.file_path);
        let lock = self.locks.lock_for(path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut backup = FileBackup::take(path)?;
        let change = self.transform(issue, backup.contents())?;
        // Nothing was written on this path; an early error return above
        // would have restored via the guard's drop
        backup.disarm();
        Ok(change)
    }

    fn attempt(
        &self,
        backend: &dyn Backend,
        source: &str,
        m: &MatchResult,
        func_name: &str,
        metrics: &mut TransformMetrics,
    ) -> Result<AttemptEnd> {
        let transformed = match backend.apply(source, m) {
            Ok(t) => t,
            Err(Error::TransformFailed { reason, .. }) => {
                tracing::debug!(
                    pattern = %m.pattern_id,
                    backend = %backend.id(),
                    reason = %reason,
                    "backend could not apply plan"
                );
                metrics.record(m.pattern_id, backend.id(), source, None, None);
                return Ok(AttemptEnd::Retryable);
            }
            Err(e) => return Err(e),
        };

        let old_region = (m.target_span.start_line, m.target_span.end_line);
        let result = self
            .validator
            .validate(source, &transformed, func_name, old_region)?;
        metrics.record(
            m.pattern_id,
            backend.id(),
            source,
            Some(&transformed),
            Some(result.clone()),
        );

        if result.accepted() {
            let delta = transformed.lines().count() as isize - source.lines().count() as isize;
            let new_region = (
                old_region.0,
                (old_region.1 as isize + delta).max(old_region.0 as isize) as usize,
            );
            tracing::info!(
                pattern = %m.pattern_id,
                backend = %backend.id(),
                lines = ?old_region,
                "transform accepted"
            );
            return Ok(AttemptEnd::Accepted(ChangeSpec {
                line_range: old_region,
                old_code: slice_lines(source, old_region.0, old_region.1),
                new_code: slice_lines(&transformed, new_region.0, new_region.1),
                reason: m.pattern_id.to_string(),
            }));
        }

        tracing::debug!(
            pattern = %m.pattern_id,
            backend = %backend.id(),
            failure = ?result.failure,
            diagnostics = ?result.diagnostics,
            "candidate rejected"
        );
        match result.failure {
            Some(f) if f.is_formatting_only() => Ok(AttemptEnd::Retryable),
            _ => Ok(AttemptEnd::Rejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn issue(lines: (usize, usize)) -> Issue {
        Issue {
            file_path: "sample.py".to_string(),
            line_range: lines,
            issue_type: "complexity".to_string(),
            current_complexity: 11,
        }
    }

    #[test]
    fn test_accepts_early_return_rewrite() {
        let source = "def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
";
        let engine = TransformEngine::new();
        let change = engine
            .transform(&issue((1, 5)), source)
            .unwrap()
            .expect("should produce an edit");
        assert_eq!(change.line_range, (1, 5));
        assert_eq!(change.old_code, source.trim_end());
        assert_eq!(change.reason, "early_return");
        assert!(change.new_code.contains("if not items:"));
    }

    #[test]
    fn test_old_code_is_verbatim_slice() {
        let source = "import os


def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
";
        let engine = TransformEngine::new();
        let change = engine
            .transform(&issue((4, 8)), source)
            .unwrap()
            .expect("should produce an edit");
        assert_eq!(
            change.old_code,
            slice_lines(source, change.line_range.0, change.line_range.1)
        );
    }

    #[test]
    fn test_crlf_source_is_skipped_not_an_error() {
        // Line splicing would rewrite the endings and break the verbatim
        // old_code guarantee, so CRLF input is left for a human
        let source = "def process(items):\r\n    if items:\r\n        for item in items:\r\n            if item:\r\n                handle(item)\r\n";
        let engine = TransformEngine::new();
        let outcome = engine
            .transform_with_cancel(&issue((1, 5)), source, &CancelToken::new())
            .unwrap();
        assert!(outcome.change.is_none());
        assert!(outcome.metrics.attempts.is_empty());
    }

    #[test]
    fn test_broken_source_is_skipped_not_an_error() {
        let source = "def process(items:\n    if items\n";
        let engine = TransformEngine::new();
        assert!(engine.transform(&issue((1, 2)), source).unwrap().is_none());
    }

    #[test]
    fn test_metrics_report_lists_attempts() {
        let source = "def process(items):
    checked = prepare(items)
    # filter note
    if checked:
        for item in checked:
            if item:
                handle(item)
";
        let engine = TransformEngine::new();
        let outcome = engine
            .transform_with_cancel(&issue((1, 7)), source, &CancelToken::new())
            .unwrap();
        let report = outcome.metrics.to_report();
        assert!(report.contains("early_return via tree: rejected (formatting_lost)"));
        assert!(report.contains("early_return via line: accepted"));
    }

    #[test]
    fn test_no_function_at_line_is_none() {
        let source = "x = 1\ny = 2\n";
        let engine = TransformEngine::new();
        assert!(engine.transform(&issue((1, 2)), source).unwrap().is_none());
    }

    #[test]
    fn test_simple_function_has_no_candidates() {
        let source = "def f(x):\n    return x\n";
        let engine = TransformEngine::new();
        let outcome = engine
            .transform_with_cancel(&issue((1, 2)), source, &CancelToken::new())
            .unwrap();
        assert!(outcome.change.is_none());
        assert_eq!(outcome.metrics.candidates_seen, 0);
    }

    #[test]
    fn test_cancelled_before_first_candidate() {
        let source = "def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
";
        let engine = TransformEngine::new();
        let token = CancelToken::new();
        token.cancel();
        let outcome = engine
            .transform_with_cancel(&issue((1, 5)), source, &token)
            .unwrap();
        assert!(outcome.change.is_none());
        assert!(outcome.metrics.attempts.is_empty());
    }

    #[test]
    fn test_fallback_engages_on_dropped_comment() {
        // The structural backend discards the comment between the two
        // leading statements; only the line backend keeps it
        let source = "def process(items):
    checked = prepare(items)
    # filter note
    if checked:
        for item in checked:
            if item:
                handle(item)
";
        let engine = TransformEngine::new();
        let outcome = engine
            .transform_with_cancel(&issue((1, 7)), source, &CancelToken::new())
            .unwrap();
        let change = outcome.change.expect("fallback should land the edit");
        assert!(change.new_code.contains("# filter note"));

        let backends: Vec<BackendId> =
            outcome.metrics.attempts.iter().map(|a| a.backend).collect();
        assert_eq!(backends, vec![BackendId::Tree, BackendId::Line]);
        assert_eq!(
            outcome.metrics.attempts[0].failure,
            Some(GateFailure::FormattingLost)
        );
        assert!(outcome.metrics.attempts[1].accepted);
    }

    #[test]
    fn test_attempts_carry_inputs_and_gate_results() {
        let source = "def process(items):
    checked = prepare(items)
    # filter note
    if checked:
        for item in checked:
            if item:
                handle(item)
";
        let engine = TransformEngine::new();
        let outcome = engine
            .transform_with_cancel(&issue((1, 7)), source, &CancelToken::new())
            .unwrap();
        assert!(outcome.change.is_some());

        // Every attempt records the pristine caller source, never another
        // backend's output
        for a in &outcome.metrics.attempts {
            assert_eq!(a.original_code, source);
        }

        let tree = &outcome.metrics.attempts[0];
        let transformed = tree.transformed_code.as_ref().expect("plan applied");
        assert!(!transformed.contains("# filter note"));
        let gates = tree.validation.as_ref().expect("validation ran");
        assert!(gates.syntax_ok && gates.complexity_ok && gates.behavior_ok);
        assert!(!gates.formatting_ok);
        assert!(!gates.diagnostics.is_empty());

        let line = &outcome.metrics.attempts[1];
        assert!(line
            .transformed_code
            .as_ref()
            .is_some_and(|t| t.contains("# filter note")));
    }

    #[test]
    fn test_fallback_disabled_abandons_candidate() {
        let source = "def process(items):
    checked = prepare(items)
    # filter note
    if checked:
        for item in checked:
            if item:
                handle(item)
";
        let engine = TransformEngine::with_config(EngineConfig {
            enable_fallback_backend: false,
            ..EngineConfig::default()
        });
        let outcome = engine
            .transform_with_cancel(&issue((1, 7)), source, &CancelToken::new())
            .unwrap();
        assert!(outcome.change.is_none());
        assert!(outcome
            .metrics
            .attempts
            .iter()
            .all(|a| a.backend == BackendId::Tree));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let source = "def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
";
        let engine = TransformEngine::new();
        let a = engine.transform(&issue((1, 5)), source).unwrap();
        let b = engine.transform(&issue((1, 5)), source).unwrap();
        assert_eq!(a, b);
    }
}
