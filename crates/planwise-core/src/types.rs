//! # Domain Types
//!
//! Record types persisted by Planwise.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Record Types                                    │
//! │                                                                         │
//! │  Record = RecordMeta + Entity + passthrough fields                     │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   RecordMeta    │   │  Named entities │   │    Coverage     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID v7)   │   │  Plan           │   │  planId?        │       │
//! │  │  type           │   │  Person         │   │  categoryId?    │       │
//! │  │  isDeleted?     │   │  Category       │   │  before/after   │       │
//! │  │  updatedAt      │   │  Expense        │   │  deductible     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! - `id` is immutable after creation and sorts by creation time.
//! - References between records (`personId`, `planId`, ...) are soft: nothing
//!   enforces that the target exists, and deleting a target cascades nowhere.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

// =============================================================================
// Table Name
// =============================================================================

/// The fixed set of entity kinds, one table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TableName {
    Plan,
    Person,
    Category,
    Expense,
    Coverage,
}

impl TableName {
    /// Every table, in snapshot order.
    pub const ALL: [TableName; 5] = [
        TableName::Plan,
        TableName::Person,
        TableName::Category,
        TableName::Expense,
        TableName::Coverage,
    ];

    /// Returns the wire name (`"plan"`, `"person"`, ...).
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableName::Plan => "plan",
            TableName::Person => "person",
            TableName::Category => "category",
            TableName::Expense => "expense",
            TableName::Coverage => "coverage",
        }
    }

    /// Returns true for tables whose records carry `name`/`description`.
    pub const fn is_named(&self) -> bool {
        !matches!(self, TableName::Coverage)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown table: '{0}'")]
pub struct UnknownTable(pub String);

impl FromStr for TableName {
    type Err = UnknownTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTable(s.to_string()))
    }
}

// =============================================================================
// Record Type
// =============================================================================

/// The `type` discriminator stored on every record.
///
/// `Deleted` is the legacy tombstone marker; normalization rewrites it to the
/// owning table's kind plus `isDeleted: true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Plan,
    Person,
    Category,
    Expense,
    Coverage,
    Deleted,
}

impl RecordType {
    pub const DELETED: &'static str = "deleted";

    /// Returns the table this type belongs to, if any.
    pub const fn table(&self) -> Option<TableName> {
        match self {
            RecordType::Plan => Some(TableName::Plan),
            RecordType::Person => Some(TableName::Person),
            RecordType::Category => Some(TableName::Category),
            RecordType::Expense => Some(TableName::Expense),
            RecordType::Coverage => Some(TableName::Coverage),
            RecordType::Deleted => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self.table() {
            Some(table) => table.as_str(),
            None => Self::DELETED,
        }
    }
}

impl From<TableName> for RecordType {
    fn from(table: TableName) -> Self {
        match table {
            TableName::Plan => RecordType::Plan,
            TableName::Person => RecordType::Person,
            TableName::Category => RecordType::Category,
            TableName::Expense => RecordType::Expense,
            TableName::Coverage => RecordType::Coverage,
        }
    }
}

impl FromStr for RecordType {
    type Err = UnknownTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::DELETED {
            return Ok(RecordType::Deleted);
        }
        s.parse::<TableName>().map(RecordType::from)
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Mints a new record id.
///
/// UUID v7 puts the millisecond timestamp in the high bits, so ids sort by
/// creation time in their canonical string form and can be minted offline.
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

// =============================================================================
// Timestamps
// =============================================================================

/// Formats a timestamp the way records store it (RFC 3339, milliseconds, `Z`).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// =============================================================================
// Record Meta
// =============================================================================

/// Fields shared by every record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMeta {
    /// Globally unique, creation-ordered identifier (UUID v7).
    pub id: String,

    /// Discriminator, see [`RecordType`].
    pub record_type: RecordType,

    /// Tombstone flag. `Some(true)` means logically removed.
    pub is_deleted: Option<bool>,

    /// Version signal for last-write-wins. `None` only for records that
    /// have never been written by the table store.
    pub updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Entities
// =============================================================================

/// One side of a plan's limits (in-network or out-of-network), in dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimit {
    pub deductible: f64,
    pub family_deductible: f64,
    pub out_of_pocket_max: f64,
    pub family_out_of_pocket_max: f64,
}

impl PlanLimit {
    /// Deductible that applies to this plan shape.
    pub fn effective_deductible(&self, family: bool) -> Money {
        Money::from_dollars(if family {
            self.family_deductible
        } else {
            self.deductible
        })
    }

    /// Out-of-pocket cap that applies to this plan shape.
    pub fn effective_out_of_pocket_max(&self, family: bool) -> Money {
        Money::from_dollars(if family {
            self.family_out_of_pocket_max
        } else {
            self.out_of_pocket_max
        })
    }
}

/// An insurance plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
    /// Monthly premium in dollars.
    pub premium: f64,
    pub is_family_plan: bool,
    pub in_network_limit: PlanLimit,
    pub out_of_network_limit: PlanLimit,
    /// Yearly discount in dollars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub discount: Option<f64>,
}

impl Plan {
    /// Twelve months of premium.
    pub fn annual_premium(&self) -> Money {
        Money::from_dollars(self.premium) * 12
    }

    pub fn discount(&self) -> Money {
        self.discount.map(Money::from_dollars).unwrap_or_default()
    }
}

/// A covered person. Only a reference target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
}

/// An expense category. Only a reference target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
}

/// A recurring expense of one person in one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
    pub person_id: String,
    pub category_id: String,
    /// Monthly amount in dollars.
    pub amount: f64,
    /// Active months, 1 = January. Sorted, no duplicates.
    pub months: Vec<u8>,
}

impl Expense {
    /// Monthly amount times the number of active months.
    ///
    /// ## Example
    /// ```rust
    /// use planwise_core::Expense;
    ///
    /// let expense = Expense {
    ///     name: "Therapy".into(),
    ///     description: None,
    ///     person_id: "p".into(),
    ///     category_id: "c".into(),
    ///     amount: 50.0,
    ///     months: vec![1, 2, 3],
    /// };
    /// assert_eq!(expense.annual_total().to_string(), "$150.00");
    /// ```
    pub fn annual_total(&self) -> Money {
        Money::from_dollars(self.amount) * self.months.len() as i64
    }
}

/// How a coverage term is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum CoverageKind {
    /// Member pays a fixed amount per month of care.
    Copay,
    /// Member pays this percentage of the cost.
    #[default]
    Percent,
}

/// What the member pays in one phase (before or after the deductible).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CoverageTerm {
    #[serde(rename = "type")]
    pub kind: CoverageKind,
    /// Dollars for copay, 0-100 for percent.
    pub amount: f64,
}

impl Default for CoverageTerm {
    fn default() -> Self {
        CoverageTerm {
            kind: CoverageKind::Percent,
            amount: 100.0,
        }
    }
}

impl CoverageTerm {
    /// Member share of a monthly cost under this term.
    pub fn member_share(&self, monthly_cost: Money) -> Money {
        match self.kind {
            CoverageKind::Copay => Money::from_dollars(self.amount).min(monthly_cost),
            CoverageKind::Percent => monthly_cost.percent_of(self.amount),
        }
    }
}

/// Cost sharing for a plan/category pair. Either link may be null, meaning
/// "applies to every plan" or "applies to every category".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub plan_id: Option<String>,
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub is_in_network: Option<bool>,
    pub before_deductible: CoverageTerm,
    pub after_deductible: CoverageTerm,
}

/// Entity-specific part of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Plan(Plan),
    Person(Person),
    Category(Category),
    Expense(Expense),
    Coverage(Coverage),
}

impl Entity {
    /// Table this entity lives in.
    pub const fn table(&self) -> TableName {
        match self {
            Entity::Plan(_) => TableName::Plan,
            Entity::Person(_) => TableName::Person,
            Entity::Category(_) => TableName::Category,
            Entity::Expense(_) => TableName::Expense,
            Entity::Coverage(_) => TableName::Coverage,
        }
    }

    /// Display name for named entities.
    pub fn name(&self) -> Option<&str> {
        match self {
            Entity::Plan(p) => Some(&p.name),
            Entity::Person(p) => Some(&p.name),
            Entity::Category(c) => Some(&c.name),
            Entity::Expense(e) => Some(&e.name),
            Entity::Coverage(_) => None,
        }
    }

    fn fields(&self) -> Map<String, Value> {
        let value = match self {
            Entity::Plan(p) => serde_json::to_value(p),
            Entity::Person(p) => serde_json::to_value(p),
            Entity::Category(c) => serde_json::to_value(c),
            Entity::Expense(e) => serde_json::to_value(e),
            Entity::Coverage(c) => serde_json::to_value(c),
        };

        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

// =============================================================================
// Record
// =============================================================================

/// A validated record of any table.
///
/// Built by [`crate::schema::parse`]/[`crate::schema::validate`]; serialized
/// back with [`Record::to_value`], which keeps unknown fields so that data
/// written by a newer client survives a round trip through an older one.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub meta: RecordMeta,
    pub entity: Entity,
    /// Fields the schema does not know about, preserved verbatim.
    pub extra: Map<String, Value>,
}

impl Record {
    #[inline]
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    #[inline]
    pub fn table(&self) -> TableName {
        self.entity.table()
    }

    /// True for tombstones.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.meta.is_deleted == Some(true)
    }

    #[inline]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.meta.updated_at
    }

    pub fn name(&self) -> Option<&str> {
        self.entity.name()
    }

    pub fn as_plan(&self) -> Option<&Plan> {
        match &self.entity {
            Entity::Plan(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_expense(&self) -> Option<&Expense> {
        match &self.entity {
            Entity::Expense(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_coverage(&self) -> Option<&Coverage> {
        match &self.entity {
            Entity::Coverage(c) => Some(c),
            _ => None,
        }
    }

    /// Serializes the record as a JSON object.
    ///
    /// Known fields win over passthrough fields with the same key.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.meta.id.clone()));
        map.insert(
            "type".into(),
            Value::String(self.meta.record_type.as_str().to_string()),
        );
        if let Some(deleted) = self.meta.is_deleted {
            map.insert("isDeleted".into(), Value::Bool(deleted));
        }
        if let Some(ts) = &self.meta.updated_at {
            map.insert("updatedAt".into(), Value::String(format_timestamp(ts)));
        }

        map.extend(self.entity.fields());

        for (key, value) in &self.extra {
            if !map.contains_key(key) {
                map.insert(key.clone(), value.clone());
            }
        }

        Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_round_trip() {
        for table in TableName::ALL {
            assert_eq!(table.as_str().parse::<TableName>().unwrap(), table);
        }
        assert!("deleted".parse::<TableName>().is_err());
    }

    #[test]
    fn test_record_type_deleted_has_no_table() {
        let t: RecordType = "deleted".parse().unwrap();
        assert_eq!(t, RecordType::Deleted);
        assert_eq!(t.table(), None);
        assert_eq!(RecordType::from(TableName::Expense).as_str(), "expense");
    }

    #[test]
    fn test_new_record_ids_sort_by_creation() {
        let ids: Vec<String> = (0..50).map(|_| new_record_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(Uuid::parse_str(&ids[0]).is_ok());
    }

    #[test]
    fn test_timestamp_format_is_millis_utc() {
        let ts = parse_timestamp("2024-03-01T10:20:30.123456+02:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T08:20:30.123Z");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_coverage_term_member_share() {
        let cost = Money::from_cents(20_000);

        let percent = CoverageTerm {
            kind: CoverageKind::Percent,
            amount: 20.0,
        };
        assert_eq!(percent.member_share(cost).cents(), 4_000);

        let copay = CoverageTerm {
            kind: CoverageKind::Copay,
            amount: 30.0,
        };
        assert_eq!(copay.member_share(cost).cents(), 3_000);

        // A copay never exceeds the cost itself
        assert_eq!(copay.member_share(Money::from_cents(1_000)).cents(), 1_000);
    }

    #[test]
    fn test_record_to_value_keeps_passthrough_fields() {
        let mut extra = Map::new();
        extra.insert("color".into(), Value::String("teal".into()));
        extra.insert("name".into(), Value::String("shadowed".into()));

        let record = Record {
            meta: RecordMeta {
                id: "0190b6a4-7c1e-7000-8000-000000000001".into(),
                record_type: RecordType::Person,
                is_deleted: None,
                updated_at: None,
            },
            entity: Entity::Person(Person {
                name: "Alex".into(),
                description: None,
            }),
            extra,
        };

        let value = record.to_value();
        assert_eq!(value["type"], "person");
        assert_eq!(value["name"], "Alex");
        assert_eq!(value["color"], "teal");
        assert!(value.get("isDeleted").is_none());
        assert!(value.get("updatedAt").is_none());
    }

    #[test]
    fn test_optional_fields_export_as_optional() {
        assert!(Person::decl().contains("description?: string"));
        assert!(Plan::decl().contains("discount?: number"));
        assert!(Coverage::decl().contains("isInNetwork?: boolean"));
    }

    #[test]
    fn test_huge_amount_total_saturates() {
        let expense = Expense {
            name: "Surgery".into(),
            description: None,
            person_id: "p".into(),
            category_id: "c".into(),
            amount: 1e17,
            months: vec![1, 2, 3],
        };
        assert_eq!(expense.annual_total(), Money::from_cents(i64::MAX));
    }
}
