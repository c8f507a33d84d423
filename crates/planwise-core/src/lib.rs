//! # planwise-core: Record Schema and Plan Math
//!
//! Pure types and functions shared by every other Planwise crate. No
//! database, no network, no clock reads beyond minting ids.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Planwise Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI shell (external)                          │   │
//! │  │    Plans ──► People ──► Categories ──► Expenses ──► Report      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ get / list / save / delete             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        planwise-sync  (session, debounced backup engine)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        planwise-db    (SQLite table store, snapshot)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ planwise-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  schema   │  │   money   │  │  report   │  │   │
//! │  │   │  Record   │  │ normalize │  │   Money   │  │ ReportPlan│  │   │
//! │  │   │  Entity   │  │ validate  │  │  (cents)  │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Record, entities, table names
//! - [`schema`] - normalize / validate / parse raw JSON into records
//! - [`money`] - Integer-cent money for derived totals
//! - [`report`] - Yearly cost per plan
//! - [`error`] - Validation errors
//!
//! ## Example Usage
//!
//! ```rust
//! use planwise_core::{schema, TableName};
//! use serde_json::json;
//!
//! let record = schema::parse(
//!     TableName::Expense,
//!     json!({
//!         "id": "0190b6a4-7c1e-7000-8000-000000000001",
//!         "name": "Therapy",
//!         "personId": "0190b6a4-7c1e-7000-8000-0000000000aa",
//!         "categoryId": "0190b6a4-7c1e-7000-8000-0000000000bb",
//!         "amount": 50,
//!         "months": [1, 2, 3],
//!     }),
//! )
//! .unwrap();
//!
//! let total = record.as_expense().unwrap().annual_total();
//! assert_eq!(total.to_string(), "$150.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod report;
pub mod schema;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{FieldViolation, ValidationError};
pub use money::Money;
pub use report::{cost_report, ReportPlan};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Name given to named records created without one.
pub const DEFAULT_NAME: &str = "Unnamed";

/// Minimum length of `name` and `description`, in characters.
pub const NAME_MIN: usize = 3;

/// Maximum length of `name` and `description`, in characters.
pub const NAME_MAX: usize = 255;
