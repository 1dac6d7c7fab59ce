//! Validation error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field-level constraint violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the offending field as seen by the client.
    pub field: String,

    /// Human-readable description of the broken constraint.
    pub message: String,
}

impl Violation {
    /// Creates a new violation.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Input was rejected by one or more validation rules.
///
/// Never retried; the HTTP layer reports it as a bad request carrying the
/// full violation list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation failed: {}", join(.violations))]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    /// Creates a validation error from a non-empty list of violations.
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// Creates a validation error with a single violation.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![Violation::new(field, message)])
    }

    /// Returns the collected violations.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Consumes the error and returns the collected violations.
    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
