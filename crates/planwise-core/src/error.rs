//! # Error Types
//!
//! Validation errors produced by the record schema.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  planwise-core errors (this file)                                      │
//! │  ├── FieldViolation   - One broken constraint on one field             │
//! │  └── ValidationError  - Every violation found in one input             │
//! │                                                                         │
//! │  planwise-db errors (separate crate)                                   │
//! │  └── DbError          - Wraps ValidationError, adds NotFound etc.      │
//! │                                                                         │
//! │  planwise-sync errors (separate crate)                                 │
//! │  └── AuthError / SyncError                                             │
//! │                                                                         │
//! │  Flow: FieldViolation → ValidationError → DbError → caller (UI)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Every violation names the field path (`inNetworkLimit.deductible`)
//! 3. Validation never stops at the first problem

use thiserror::Error;

use crate::types::TableName;

// =============================================================================
// Field Violation
// =============================================================================

/// A single violated field constraint.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldViolation {
    /// A required field is missing or null.
    #[error("{field} is required")]
    Required { field: String },

    /// Field has the wrong JSON type.
    #[error("{field} must be {expected}")]
    WrongType { field: String, expected: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range. `max` is infinite for "at least" checks.
    #[error("{field} must be {}", describe_range(.min, .max))]
    OutOfRange { field: String, min: f64, max: f64 },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl FieldViolation {
    /// Returns the path of the offending field.
    pub fn field(&self) -> &str {
        match self {
            FieldViolation::Required { field }
            | FieldViolation::WrongType { field, .. }
            | FieldViolation::TooShort { field, .. }
            | FieldViolation::TooLong { field, .. }
            | FieldViolation::OutOfRange { field, .. }
            | FieldViolation::InvalidFormat { field, .. }
            | FieldViolation::NotAllowed { field, .. } => field,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input rejected by the record schema.
///
/// Carries every violation found, so a form can highlight all bad fields at
/// once instead of one per round trip.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {table} record: {}", join_violations(.violations))]
pub struct ValidationError {
    /// Table the input was validated against.
    pub table: TableName,

    /// Violations in field order of discovery. Never empty.
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Creates a validation error from collected violations.
    pub fn new(table: TableName, violations: Vec<FieldViolation>) -> Self {
        ValidationError { table, violations }
    }

    /// Returns true if any violation concerns `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field() == field)
    }
}

fn describe_range(min: &f64, max: &f64) -> String {
    if max.is_finite() {
        format!("between {min} and {max}")
    } else {
        format!("at least {min}")
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Unit Tests
// =============================================================================
