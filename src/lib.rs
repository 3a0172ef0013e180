// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # Detangle — automated complexity-reduction edits for Python
//!
//! Detangle takes a flagged complexity violation in a function and tries to
//! produce one minimal, validated source edit that reduces it. The edit is
//! proposed as a [`ChangeSpec`]; nothing is ever written back to the
//! offending file.
//!
//! ## Pipeline
//!
//! ```text
//! Issue ──► parse ──► pattern match (priority order)
//!                          │
//!                          ▼
//!                  structural backend ──► 4-gate validation ──► ChangeSpec
//!                          │ formatting rejected, or plan not applicable
//!                          ▼
//!                  line-splice backend ──► 4-gate validation ──► ChangeSpec
//! ```
//!
//! Four patterns are tried, least invasive first: inverting a trailing
//! conditional into an early return, hoisting a leading validation into a
//! guard clause, naming the pieces of a compound condition, and extracting
//! a cohesive block into a helper function. Each candidate rewrite must
//! clear four ordered gates — it still parses, it strictly reduces the
//! complexity score, it preserves the function's behavioral fingerprint,
//! and it loses no comments, docstrings, or untouched lines. The first
//! candidate to clear all four wins; if none does, the issue is left for a
//! human.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use detangle::{Issue, TransformEngine};
//!
//! let engine = TransformEngine::new();
//! let issue = Issue {
//!     file_path: "service.py".into(),
//!     line_range: (42, 73),
//!     issue_type: "complexity".into(),
//!     current_complexity: 14,
//! };
//!
//! let source = std::fs::read_to_string(&issue.file_path)?;
//! match engine.transform(&issue, &source)? {
//!     Some(change) => println!("{}", serde_json::to_string_pretty(&change)?),
//!     None => println!("no safe transform found"),
//! }
//! ```

// Source model
pub mod ast;
pub mod complexity;
pub mod error;
pub mod parse;

// Transformation
pub mod backend;
pub mod engine;
pub mod patterns;
pub mod validate;

// Infrastructure
pub mod lock;
pub mod util;

// Re-exports
pub use backend::{Backend, BackendId, LineBackend, TreeBackend};
pub use complexity::{complexity, complexity_with_deadline, DeadlineExceeded};
pub use engine::{
    CancelToken, ChangeSpec, EngineConfig, Issue, TransformAttempt, TransformEngine,
    TransformMetrics, TransformOutcome,
};
pub use error::{Error, Result};
pub use parse::{parse_module, parses_cleanly};
pub use patterns::{MatchResult, Pattern, PatternId, PatternMatcher, RewritePlan};
pub use validate::{GateFailure, TransformValidator, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
