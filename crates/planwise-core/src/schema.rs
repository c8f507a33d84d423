//! # Record Schema
//!
//! Turns untyped JSON input into typed [`Record`]s.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Schema Pipeline                                 │
//! │                                                                         │
//! │   raw JSON ──► normalize() ──► validate() ──► Record                   │
//! │                 │                 │                                     │
//! │                 │                 └── collects EVERY violation          │
//! │                 │                     into one ValidationError          │
//! │                 │                                                       │
//! │                 └── fills defaults, rewrites legacy shapes              │
//! │                     never touches id or updatedAt                       │
//! │                                                                         │
//! │   parse() = normalize() + validate()                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Properties
//! - Both steps are pure and deterministic.
//! - `normalize(normalize(x)) == normalize(x)`.
//! - Re-parsing `record.to_value()` yields the same record, including its
//!   `updatedAt`. Only the table store stamps timestamps.
//!
//! ## Usage
//! ```rust
//! use planwise_core::{schema, TableName};
//! use serde_json::json;
//!
//! let record = schema::parse(
//!     TableName::Person,
//!     json!({ "id": "0190b6a4-7c1e-7000-8000-000000000001" }),
//! )
//! .unwrap();
//!
//! assert_eq!(record.name(), Some("Unnamed"));
//! ```

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{FieldViolation, ValidationError};
use crate::types::{
    parse_timestamp, Category, Coverage, CoverageKind, CoverageTerm, Entity, Expense, Person,
    Plan, PlanLimit, Record, RecordMeta, RecordType, TableName,
};
use crate::{DEFAULT_NAME, NAME_MAX, NAME_MIN};

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, ValidationError>;

/// Key the first releases wrote for the in-network limits.
const LEGACY_IN_NETWORK_KEY: &str = "inNetworkLimt";

const BASE_FIELDS: &[&str] = &["id", "type", "isDeleted", "updatedAt"];
const NAMED_FIELDS: &[&str] = &["name", "description"];
const PLAN_FIELDS: &[&str] = &[
    "premium",
    "isFamilyPlan",
    "inNetworkLimit",
    "outOfNetworkLimit",
    "discount",
];
const EXPENSE_FIELDS: &[&str] = &["personId", "categoryId", "amount", "months"];
const COVERAGE_FIELDS: &[&str] = &[
    "planId",
    "categoryId",
    "isInNetwork",
    "beforeDeductible",
    "afterDeductible",
];

/// Returns true if `key` is a schema field of `table`.
///
/// Everything else is passthrough and lands in [`Record::extra`].
pub fn is_known_field(table: TableName, key: &str) -> bool {
    if BASE_FIELDS.contains(&key) {
        return true;
    }
    if table.is_named() && NAMED_FIELDS.contains(&key) {
        return true;
    }
    match table {
        TableName::Plan => PLAN_FIELDS.contains(&key),
        TableName::Expense => EXPENSE_FIELDS.contains(&key),
        TableName::Coverage => COVERAGE_FIELDS.contains(&key),
        TableName::Person | TableName::Category => false,
    }
}

// =============================================================================
// Normalize
// =============================================================================

/// Applies defaults and rewrites legacy shapes.
///
/// ## Rules
/// - missing `type` → the table kind
/// - `type: "deleted"` → the table kind plus `isDeleted: true`
/// - named tables: missing `name` → `"Unnamed"`
/// - plan: `inNetworkLimt` → `inNetworkLimit`, missing `isFamilyPlan` → `false`
/// - coverage: missing `planId`/`categoryId` → `null`, missing terms (or
///   their parts) → `{ "type": "percent", "amount": 100 }`
/// - expense: missing `months` → `[]`, integer months sorted and de-duplicated
///
/// Non-object input is returned unchanged; [`validate`] reports it.
pub fn normalize(table: TableName, value: Value) -> Value {
    let Value::Object(mut obj) = value else {
        return value;
    };

    let tombstone = obj.get("type").and_then(Value::as_str) == Some(RecordType::DELETED);
    if tombstone || is_absent(obj.get("type")) {
        obj.insert("type".into(), Value::String(table.as_str().into()));
    }
    if tombstone {
        obj.insert("isDeleted".into(), Value::Bool(true));
    }

    if table.is_named() && is_absent(obj.get("name")) {
        obj.insert("name".into(), Value::String(DEFAULT_NAME.into()));
    }

    match table {
        TableName::Plan => {
            if let Some(legacy) = obj.remove(LEGACY_IN_NETWORK_KEY) {
                if is_absent(obj.get("inNetworkLimit")) {
                    obj.insert("inNetworkLimit".into(), legacy);
                }
            }
            if is_absent(obj.get("isFamilyPlan")) {
                obj.insert("isFamilyPlan".into(), Value::Bool(false));
            }
        }
        TableName::Coverage => {
            obj.entry("planId").or_insert(Value::Null);
            obj.entry("categoryId").or_insert(Value::Null);
            for key in ["beforeDeductible", "afterDeductible"] {
                normalize_term(&mut obj, key);
            }
        }
        TableName::Expense => normalize_months(&mut obj),
        TableName::Person | TableName::Category => {}
    }

    Value::Object(obj)
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn normalize_term(obj: &mut Map<String, Value>, key: &str) {
    let default = CoverageTerm::default();
    if is_absent(obj.get(key)) {
        let mut term = Map::new();
        term.insert("type".into(), Value::String("percent".into()));
        term.insert("amount".into(), Value::from(default.amount));
        obj.insert(key.into(), Value::Object(term));
        return;
    }

    if let Some(Value::Object(term)) = obj.get_mut(key) {
        if is_absent(term.get("type")) {
            term.insert("type".into(), Value::String("percent".into()));
        }
        if is_absent(term.get("amount")) {
            term.insert("amount".into(), Value::from(default.amount));
        }
    }
}

fn normalize_months(obj: &mut Map<String, Value>) {
    if is_absent(obj.get("months")) {
        obj.insert("months".into(), Value::Array(Vec::new()));
        return;
    }

    let months: Option<BTreeSet<u64>> = obj
        .get("months")
        .and_then(Value::as_array)
        .and_then(|items| items.iter().map(Value::as_u64).collect());

    // Leave anything else alone so validate() can point at the bad entry
    if let Some(months) = months {
        let months = months.into_iter().map(Value::from).collect();
        obj.insert("months".into(), Value::Array(months));
    }
}

// =============================================================================
// Validate
// =============================================================================

/// Checks `value` against the schema of `table`.
///
/// Never stops at the first problem: the returned error lists every violated
/// constraint. Does not apply defaults; use [`parse`] for raw input.
pub fn validate(table: TableName, value: &Value) -> SchemaResult<Record> {
    let Some(obj) = value.as_object() else {
        return Err(ValidationError::new(
            table,
            vec![FieldViolation::WrongType {
                field: "record".into(),
                expected: "an object".into(),
            }],
        ));
    };

    let mut checker = Checker::default();
    let fields = Fields::root(obj);

    let meta = checker.meta(&fields, table);
    let entity = match table {
        TableName::Plan => checker.plan(&fields).map(Entity::Plan),
        TableName::Person => checker
            .named(&fields)
            .map(|(name, description)| Entity::Person(Person { name, description })),
        TableName::Category => checker
            .named(&fields)
            .map(|(name, description)| Entity::Category(Category { name, description })),
        TableName::Expense => checker.expense(&fields).map(Entity::Expense),
        TableName::Coverage => checker.coverage(&fields).map(Entity::Coverage),
    };

    match (meta, entity) {
        (Some(meta), Some(entity)) if checker.violations.is_empty() => {
            let extra = obj
                .iter()
                .filter(|(key, _)| !is_known_field(table, key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Ok(Record {
                meta,
                entity,
                extra,
            })
        }
        _ => Err(ValidationError::new(table, checker.violations)),
    }
}

/// Normalizes then validates raw input.
pub fn parse(table: TableName, value: Value) -> SchemaResult<Record> {
    validate(table, &normalize(table, value))
}

// =============================================================================
// Field Checks
// =============================================================================

/// A JSON object plus the path it was reached by, for violation messages.
struct Fields<'a> {
    obj: &'a Map<String, Value>,
    prefix: String,
}

impl<'a> Fields<'a> {
    fn root(obj: &'a Map<String, Value>) -> Self {
        Fields {
            obj,
            prefix: String::new(),
        }
    }

    fn path(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    /// Present and non-null value of `key`.
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }
}

/// Accumulates violations. Every check returns `None` after recording one.
#[derive(Default)]
struct Checker {
    violations: Vec<FieldViolation>,
}

impl Checker {
    fn push(&mut self, violation: FieldViolation) {
        self.violations.push(violation);
    }

    fn wrong_type(&mut self, fields: &Fields<'_>, key: &str, expected: &str) {
        self.push(FieldViolation::WrongType {
            field: fields.path(key),
            expected: expected.into(),
        });
    }

    fn required<'a>(&mut self, fields: &Fields<'a>, key: &str) -> Option<&'a Value> {
        let value = fields.get(key);
        if value.is_none() {
            self.push(FieldViolation::Required {
                field: fields.path(key),
            });
        }
        value
    }

    // -------------------------------------------------------------------------
    // Primitives
    // -------------------------------------------------------------------------

    fn text(&mut self, fields: &Fields<'_>, key: &str, value: &Value) -> Option<String> {
        let Some(text) = value.as_str() else {
            self.wrong_type(fields, key, "a string");
            return None;
        };

        let len = text.chars().count();
        if len < NAME_MIN {
            self.push(FieldViolation::TooShort {
                field: fields.path(key),
                min: NAME_MIN,
            });
            return None;
        }
        if len > NAME_MAX {
            self.push(FieldViolation::TooLong {
                field: fields.path(key),
                max: NAME_MAX,
            });
            return None;
        }
        Some(text.to_string())
    }

    fn required_text(&mut self, fields: &Fields<'_>, key: &str) -> Option<String> {
        let value = self.required(fields, key)?;
        self.text(fields, key, value)
    }

    fn optional_text(&mut self, fields: &Fields<'_>, key: &str) -> Option<Option<String>> {
        match fields.get(key) {
            None => Some(None),
            Some(value) => self.text(fields, key, value).map(Some),
        }
    }

    fn number(&mut self, fields: &Fields<'_>, key: &str, value: &Value, max: f64) -> Option<f64> {
        let Some(number) = value.as_f64() else {
            self.wrong_type(fields, key, "a number");
            return None;
        };

        if !(0.0..=max).contains(&number) {
            self.push(FieldViolation::OutOfRange {
                field: fields.path(key),
                min: 0.0,
                max,
            });
            return None;
        }
        Some(number)
    }

    /// Required non-negative dollar amount.
    fn amount(&mut self, fields: &Fields<'_>, key: &str) -> Option<f64> {
        let value = self.required(fields, key)?;
        self.number(fields, key, value, f64::INFINITY)
    }

    fn optional_amount(&mut self, fields: &Fields<'_>, key: &str) -> Option<Option<f64>> {
        match fields.get(key) {
            None => Some(None),
            Some(value) => self.number(fields, key, value, f64::INFINITY).map(Some),
        }
    }

    fn boolean(&mut self, fields: &Fields<'_>, key: &str, value: &Value) -> Option<bool> {
        let flag = value.as_bool();
        if flag.is_none() {
            self.wrong_type(fields, key, "a boolean");
        }
        flag
    }

    fn required_bool(&mut self, fields: &Fields<'_>, key: &str) -> Option<bool> {
        let value = self.required(fields, key)?;
        self.boolean(fields, key, value)
    }

    fn optional_bool(&mut self, fields: &Fields<'_>, key: &str) -> Option<Option<bool>> {
        match fields.get(key) {
            None => Some(None),
            Some(value) => self.boolean(fields, key, value).map(Some),
        }
    }

    fn uuid(&mut self, fields: &Fields<'_>, key: &str, value: &Value) -> Option<String> {
        let Some(raw) = value.as_str() else {
            self.wrong_type(fields, key, "a string");
            return None;
        };

        if Uuid::parse_str(raw).is_err() {
            self.push(FieldViolation::InvalidFormat {
                field: fields.path(key),
                reason: "must be a UUID".into(),
            });
            return None;
        }
        Some(raw.to_string())
    }

    fn required_ref(&mut self, fields: &Fields<'_>, key: &str) -> Option<String> {
        let value = self.required(fields, key)?;
        self.uuid(fields, key, value)
    }

    /// Nullable reference; null means "applies to all".
    fn nullable_ref(&mut self, fields: &Fields<'_>, key: &str) -> Option<Option<String>> {
        match fields.get(key) {
            None => Some(None),
            Some(value) => self.uuid(fields, key, value).map(Some),
        }
    }

    fn object<'a>(&mut self, fields: &Fields<'a>, key: &str) -> Option<Fields<'a>> {
        let value = self.required(fields, key)?;
        let Some(obj) = value.as_object() else {
            self.wrong_type(fields, key, "an object");
            return None;
        };
        Some(Fields {
            obj,
            prefix: fields.path(key),
        })
    }

    // -------------------------------------------------------------------------
    // Record Parts
    // -------------------------------------------------------------------------

    fn meta(&mut self, fields: &Fields<'_>, table: TableName) -> Option<RecordMeta> {
        let id = self.required(fields, "id").and_then(|v| self.uuid(fields, "id", v));

        let record_type = self.required(fields, "type").and_then(|value| {
            let parsed = value.as_str().and_then(|t| t.parse::<RecordType>().ok());
            match parsed {
                Some(t) if t == RecordType::Deleted || t.table() == Some(table) => Some(t),
                _ => {
                    self.push(FieldViolation::NotAllowed {
                        field: "type".into(),
                        allowed: vec![table.as_str().into(), RecordType::DELETED.into()],
                    });
                    None
                }
            }
        });

        let is_deleted = self.optional_bool(fields, "isDeleted");

        let updated_at = match fields.get("updatedAt") {
            None => Some(None),
            Some(value) => match value.as_str().and_then(parse_timestamp) {
                Some(ts) => Some(Some(ts)),
                None => {
                    self.push(FieldViolation::InvalidFormat {
                        field: "updatedAt".into(),
                        reason: "must be an RFC 3339 timestamp".into(),
                    });
                    None
                }
            },
        };

        Some(RecordMeta {
            id: id?,
            record_type: record_type?,
            is_deleted: is_deleted?,
            updated_at: updated_at?,
        })
    }

    fn named(&mut self, fields: &Fields<'_>) -> Option<(String, Option<String>)> {
        let name = self.required_text(fields, "name");
        let description = self.optional_text(fields, "description");
        Some((name?, description?))
    }

    fn limit(&mut self, fields: &Fields<'_>, key: &str) -> Option<PlanLimit> {
        let limit = self.object(fields, key)?;
        let deductible = self.amount(&limit, "deductible");
        let family_deductible = self.amount(&limit, "familyDeductible");
        let out_of_pocket_max = self.amount(&limit, "outOfPocketMax");
        let family_out_of_pocket_max = self.amount(&limit, "familyOutOfPocketMax");

        Some(PlanLimit {
            deductible: deductible?,
            family_deductible: family_deductible?,
            out_of_pocket_max: out_of_pocket_max?,
            family_out_of_pocket_max: family_out_of_pocket_max?,
        })
    }

    fn plan(&mut self, fields: &Fields<'_>) -> Option<Plan> {
        let named = self.named(fields);
        let premium = self.amount(fields, "premium");
        let is_family_plan = self.required_bool(fields, "isFamilyPlan");
        let in_network_limit = self.limit(fields, "inNetworkLimit");
        let out_of_network_limit = self.limit(fields, "outOfNetworkLimit");
        let discount = self.optional_amount(fields, "discount");

        let (name, description) = named?;
        Some(Plan {
            name,
            description,
            premium: premium?,
            is_family_plan: is_family_plan?,
            in_network_limit: in_network_limit?,
            out_of_network_limit: out_of_network_limit?,
            discount: discount?,
        })
    }

    fn months(&mut self, fields: &Fields<'_>) -> Option<Vec<u8>> {
        let value = self.required(fields, "months")?;
        let Some(items) = value.as_array() else {
            self.wrong_type(fields, "months", "an array");
            return None;
        };

        let mut months = BTreeSet::new();
        let mut valid = true;
        for (index, item) in items.iter().enumerate() {
            match item.as_u64().filter(|m| (1..=12).contains(m)) {
                Some(month) => {
                    months.insert(month as u8);
                }
                None => {
                    valid = false;
                    self.push(FieldViolation::OutOfRange {
                        field: format!("months[{index}]"),
                        min: 1.0,
                        max: 12.0,
                    });
                }
            }
        }

        valid.then(|| months.into_iter().collect())
    }

    fn expense(&mut self, fields: &Fields<'_>) -> Option<Expense> {
        let named = self.named(fields);
        let person_id = self.required_ref(fields, "personId");
        let category_id = self.required_ref(fields, "categoryId");
        let amount = self.amount(fields, "amount");
        let months = self.months(fields);

        let (name, description) = named?;
        Some(Expense {
            name,
            description,
            person_id: person_id?,
            category_id: category_id?,
            amount: amount?,
            months: months?,
        })
    }

    fn term(&mut self, fields: &Fields<'_>, key: &str) -> Option<CoverageTerm> {
        let term = self.object(fields, key)?;

        let kind = self.required(&term, "type").and_then(|value| {
            match value.as_str() {
                Some("copay") => Some(CoverageKind::Copay),
                Some("percent") => Some(CoverageKind::Percent),
                _ => {
                    self.push(FieldViolation::NotAllowed {
                        field: term.path("type"),
                        allowed: vec!["copay".into(), "percent".into()],
                    });
                    None
                }
            }
        });

        // Percentages are bounded; a copay only has to be non-negative
        let max = match kind {
            Some(CoverageKind::Percent) => 100.0,
            _ => f64::INFINITY,
        };
        let amount = self
            .required(&term, "amount")
            .and_then(|value| self.number(&term, "amount", value, max));

        Some(CoverageTerm {
            kind: kind?,
            amount: amount?,
        })
    }

    fn coverage(&mut self, fields: &Fields<'_>) -> Option<Coverage> {
        let plan_id = self.nullable_ref(fields, "planId");
        let category_id = self.nullable_ref(fields, "categoryId");
        let is_in_network = self.optional_bool(fields, "isInNetwork");
        let before_deductible = self.term(fields, "beforeDeductible");
        let after_deductible = self.term(fields, "afterDeductible");

        Some(Coverage {
            plan_id: plan_id?,
            category_id: category_id?,
            is_in_network: is_in_network?,
            before_deductible: before_deductible?,
            after_deductible: after_deductible?,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
