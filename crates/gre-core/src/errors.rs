//! Error taxonomy for the engine (§7).
//!
//! Propagation policy: action-invocation errors are *returned* as part of
//! `ExecutionResult`, never raised; rule-engine errors are logged and
//! swallowed per rule so a single faulty rule can't disable the system;
//! parse/validation errors at upload time are raised to the uploader.

use thiserror::Error;

use crate::parser::ParseError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("duplicate rule name: {0}")]
    DuplicateRuleName(String),
    #[error("unknown parameter type: {0}")]
    UnknownParameterType(String),
    #[error("malformed SET target: {0} (must start with this. or a bound variable)")]
    MalformedSetTarget(String),
    #[error("uploaded text contains no rule: {0}")]
    NoRuleInUpload(String),
}

/// Errors the store interface (§4.2) can surface. Kept storage-agnostic so
/// both the in-memory and the Postgres-backed store can produce it.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Backend(String),
}

/// Top-level engine error. `ParseError` and `ValidationError` are raised to
/// the uploader; the rest are recorded inline in result types (`StoreError`
/// surfaces as `ExecutionResult::failure`, `CascadeOverflow`/`ListenerError`
/// are logged, never returned to a caller that didn't ask for them).
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("action not found: {0}.{1}")]
    ActionNotFound(String, String),
    #[error("evaluation error: {0}")]
    Eval(String),
    #[error("translation error: {0}")]
    Translate(String),
}
