//! Validation gate behavior over hand-written (original, rewrite) pairs

use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;

use detangle::{GateFailure, TransformValidator};

const NESTED: &str = "def process(items):
    if items:
        for item in items:
            if item:
                handle(item)
";

const FLATTENED: &str = "def process(items):
    if not items:
        return
    for item in items:
        if item:
            handle(item)
";

#[test]
fn clean_rewrite_clears_every_gate() {
    let result = TransformValidator::default()
        .validate(NESTED, FLATTENED, "process", (1, 5))
        .unwrap();
    assert!(result.accepted(), "diagnostics: {:?}", result.diagnostics);
}

#[rstest]
#[case::unbalanced_parens(
    "def process(items):\n    if not items\n        return\n",
    GateFailure::SyntaxError
)]
#[case::identical_source(NESTED, GateFailure::ComplexityNotReduced)]
fn early_gates_reject(#[case] transformed: &str, #[case] expected: GateFailure) {
    let result = TransformValidator::default()
        .validate(NESTED, transformed, "process", (1, 5))
        .unwrap();
    assert_eq!(result.failure, Some(expected));
    assert!(!result.accepted());
}

#[test]
fn gates_short_circuit_in_order() {
    // Broken syntax plus no complexity win: only the first gate reports
    let broken = "def process(items):\n    if not items\n        return\n";
    let result = TransformValidator::default()
        .validate(NESTED, broken, "process", (1, 5))
        .unwrap();
    assert_eq!(result.failure, Some(GateFailure::SyntaxError));
    assert!(!result.syntax_ok);
    assert!(!result.complexity_ok);
    assert!(!result.behavior_ok);
    assert!(!result.formatting_ok);
}

#[test]
fn zero_deadline_reports_timeout_not_rejection() {
    let result = TransformValidator::new(Duration::ZERO)
        .validate(NESTED, FLATTENED, "process", (1, 5))
        .unwrap();
    assert_eq!(result.failure, Some(GateFailure::ComplexityTimeout));
}

#[test]
fn dropped_raise_is_a_behavior_change() {
    let original = "def check(x):
    if x > 0:
        if x > 10:
            return x
    else:
        raise ValueError(\"must be positive\")
";
    let rewritten = "def check(x):
    if x > 10:
        return x
";
    let result = TransformValidator::default()
        .validate(original, rewritten, "check", (1, 6))
        .unwrap();
    assert_eq!(result.failure, Some(GateFailure::BehaviorChanged));
}

#[test]
fn new_none_return_needs_an_existing_none_path() {
    // Original always returns a value; a bare return changes the contract
    let original = "def pick(a, b):
    if a:
        if b:
            return a
        return b
    else:
        return b
";
    let rewritten = "def pick(a, b):
    if not a:
        return
    if b:
        return a
    return b
";
    let result = TransformValidator::default()
        .validate(original, rewritten, "pick", (1, 7))
        .unwrap();
    assert_eq!(result.failure, Some(GateFailure::BehaviorChanged));
}

#[test]
fn dropped_comment_fails_formatting_only() {
    let original = "def process(items):
    if items:
        # keep me
        for item in items:
            if item:
                handle(item)
";
    let result = TransformValidator::default()
        .validate(original, FLATTENED, "process", (1, 6))
        .unwrap();
    assert_eq!(result.failure, Some(GateFailure::FormattingLost));
    // All earlier gates passed; only formatting stood in the way
    assert!(result.syntax_ok);
    assert!(result.complexity_ok);
    assert!(result.behavior_ok);
    assert!(result.failure.unwrap().is_formatting_only());
}

#[test]
fn dropped_docstring_fails_formatting() {
    let original = "def process(items):
    \"\"\"Handle every item.\"\"\"
    if items:
        for item in items:
            if item:
                handle(item)
";
    let result = TransformValidator::default()
        .validate(original, FLATTENED, "process", (1, 6))
        .unwrap();
    assert_eq!(result.failure, Some(GateFailure::FormattingLost));
}

#[test]
fn edits_outside_the_region_fail_formatting() {
    let original = format!("{}\n\ndef other():\n    return 1\n", NESTED.trim_end());
    let rewritten = format!("{}\n\ndef other():\n    return 2\n", FLATTENED.trim_end());
    let result = TransformValidator::default()
        .validate(&original, &rewritten, "process", (1, 5))
        .unwrap();
    assert_eq!(result.failure, Some(GateFailure::FormattingLost));
}
