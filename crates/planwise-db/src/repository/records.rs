//! # Table Store
//!
//! Durable storage for the records of one table.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         save(raw JSON)                                  │
//! │                                                                         │
//! │  1. mint id if absent (UUID v7)                                        │
//! │  2. schema::parse()  ──► ValidationError? return, nothing written      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  3. read stored updated_at for (table, id)                      │   │
//! │  │  4. input updatedAt < stored?  ──► StaleWrite, rollback         │   │
//! │  │  5. updatedAt = max(now, stored)                                │   │
//! │  │  6. INSERT ... ON CONFLICT DO UPDATE                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  7. ChangeSignal::notify()                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tombstones
//! `delete` is a save with `isDeleted: true`. Tombstones are invisible to
//! `get`, `list` and `count` but stay in the snapshot so a restore does not
//! bring the record back.

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::changes::ChangeSignal;
use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use planwise_core::{
    format_timestamp, new_record_id, parse_timestamp, schema, Record, TableName,
};

// =============================================================================
// List Filter
// =============================================================================

/// Equality filter on one top-level field, e.g. `personId = P`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    pub field: String,
    pub value: Value,
}

impl ListFilter {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        ListFilter {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Numbers compare by value, so `50` matches `50.0`.
    fn matches(&self, record: &Value) -> bool {
        match (record.get(&self.field), &self.value) {
            (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (Some(actual), expected) => actual == expected,
            (None, Value::Null) => true,
            (None, _) => false,
        }
    }
}

// =============================================================================
// Table Store
// =============================================================================

/// CRUD for one table. Cheap to create; holds a pool handle.
#[derive(Debug, Clone)]
pub struct TableStore {
    pool: SqlitePool,
    table: TableName,
    changes: ChangeSignal,
}

impl TableStore {
    pub fn new(pool: SqlitePool, table: TableName, changes: ChangeSignal) -> Self {
        TableStore {
            pool,
            table,
            changes,
        }
    }

    pub fn table(&self) -> TableName {
        self.table
    }

    /// Gets a live record by id.
    ///
    /// ## Returns
    /// * `Ok(Record)` - Record found
    /// * `Err(DbError::NotFound)` - Unknown id or tombstone
    pub async fn get(&self, id: &str) -> DbResult<Record> {
        match self.fetch(id).await? {
            Some(record) if !record.is_deleted() => Ok(record),
            _ => Err(DbError::not_found(self.table, id)),
        }
    }

    /// Lists live records in id (creation) order, optionally filtered.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let filter = ListFilter::new("personId", person_id);
    /// let expenses = db.expenses().list(Some(&filter)).await?;
    /// ```
    pub async fn list(&self, filter: Option<&ListFilter>) -> DbResult<Vec<Record>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT payload
            FROM records
            WHERE table_name = ?1 AND is_deleted = 0
            ORDER BY id ASC
            "#,
        )
        .bind(self.table.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (payload,) in rows {
            let value: Value = serde_json::from_str(&payload)?;
            if filter.map_or(true, |f| f.matches(&value)) {
                records.push(decode(self.table, &value)?);
            }
        }

        debug!(
            table = %self.table,
            count = records.len(),
            filtered = filter.is_some(),
            "Listed records"
        );
        Ok(records)
    }

    /// Counts live records.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM records WHERE table_name = ?1 AND is_deleted = 0",
        )
        .bind(self.table.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Inserts or updates a record from raw input.
    ///
    /// ## What This Does
    /// 1. Mints an id when the input has none
    /// 2. Normalizes and validates (every violation reported at once)
    /// 3. Rejects input whose `updatedAt` is older than the stored one
    /// 4. Stamps `updatedAt` and upserts
    ///
    /// ## Returns
    /// The stored record, with its new `updatedAt`.
    pub async fn save(&self, input: Value) -> DbResult<Record> {
        let mut input = input;
        if let Value::Object(obj) = &mut input {
            if obj.get("id").map_or(true, Value::is_null) {
                obj.insert("id".into(), Value::String(new_record_id()));
            }
        }

        let record = schema::parse(self.table, input)?;
        let provided = record.updated_at();
        self.write(record, provided).await
    }

    /// Tombstones a record.
    ///
    /// Deleting a tombstone is a no-op; an unknown id is `NotFound`.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let Some(mut record) = self.fetch(id).await? else {
            return Err(DbError::not_found(self.table, id));
        };

        if record.is_deleted() {
            debug!(table = %self.table, id = %id, "Record already deleted");
            return Ok(());
        }

        record.meta.is_deleted = Some(true);
        self.write(record, None).await?;
        Ok(())
    }

    /// Reads a record including tombstones.
    async fn fetch(&self, id: &str) -> DbResult<Option<Record>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload FROM records WHERE table_name = ?1 AND id = ?2",
        )
        .bind(self.table.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((payload,)) => {
                let value: Value = serde_json::from_str(&payload)?;
                decode(self.table, &value).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Stamps and persists a validated record.
    ///
    /// `provided` is the version the caller based its edit on; `None` skips
    /// the stale check (internal writes such as delete).
    async fn write(
        &self,
        mut record: Record,
        provided: Option<DateTime<Utc>>,
    ) -> DbResult<Record> {
        let mut tx = begin_write(&self.pool).await?;

        let stored: Option<(String,)> = sqlx::query_as(
            "SELECT updated_at FROM records WHERE table_name = ?1 AND id = ?2",
        )
        .bind(self.table.as_str())
        .bind(record.id())
        .fetch_optional(&mut *tx)
        .await?;
        let stored = stored.and_then(|(raw,)| parse_timestamp(&raw));

        if let (Some(stored), Some(provided)) = (stored, provided) {
            if provided < stored {
                warn!(
                    table = %self.table,
                    id = %record.id(),
                    %stored,
                    %provided,
                    "Rejected stale write"
                );
                return Err(DbError::StaleWrite {
                    id: record.id().to_string(),
                    stored,
                    provided,
                });
            }
        }

        let now = Utc::now().trunc_subsecs(3);
        let stamp = match stored {
            Some(stored) if stored > now => stored,
            _ => now,
        };
        record.meta.updated_at = Some(stamp);

        let payload = serde_json::to_string(&record.to_value())?;
        sqlx::query(
            r#"
            INSERT INTO records (table_name, id, payload, is_deleted, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (table_name, id) DO UPDATE SET
                payload = excluded.payload,
                is_deleted = excluded.is_deleted,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(self.table.as_str())
        .bind(record.id())
        .bind(&payload)
        .bind(record.is_deleted())
        .bind(format_timestamp(&stamp))
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(
            table = %self.table,
            id = %record.id(),
            deleted = record.is_deleted(),
            updated_at = %format_timestamp(&stamp),
            "Saved record"
        );

        self.changes.notify(self.table);
        Ok(record)
    }
}

/// Rebuilds a record from a stored payload.
pub(crate) fn decode(table: TableName, value: &Value) -> DbResult<Record> {
    schema::validate(table, value)
        .map_err(|e| DbError::Serialization(format!("stored payload is invalid: {e}")))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    const PERSON: &str = "0190b6a4-7c1e-7000-8000-0000000000aa";
    const CATEGORY: &str = "0190b6a4-7c1e-7000-8000-0000000000bb";

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn limit(deductible: u32) -> Value {
        json!({
            "deductible": deductible,
            "familyDeductible": deductible * 2,
            "outOfPocketMax": deductible * 4,
            "familyOutOfPocketMax": deductible * 8,
        })
    }

    fn plan_input() -> Value {
        json!({
            "name": "Silver HMO",
            "premium": 300,
            "isFamilyPlan": false,
            "inNetworkLimit": limit(1000),
            "outOfNetworkLimit": limit(2500),
        })
    }

    #[tokio::test]
    async fn test_save_then_get_plan() {
        let db = setup().await;
        let before = Utc::now().trunc_subsecs(3);

        let saved = db.plans().save(plan_input()).await.unwrap();
        let fetched = db.plans().get(saved.id()).await.unwrap();

        assert_eq!(fetched, saved);
        assert!(fetched.updated_at().unwrap() >= before);
        assert_eq!(fetched.as_plan().unwrap().premium, 300.0);
        assert_eq!(fetched.as_plan().unwrap().in_network_limit.deductible, 1000.0);
    }

    #[tokio::test]
    async fn test_save_keeps_given_id_and_refreshes_timestamp() {
        let db = setup().await;
        let first = db.people().save(json!({ "name": "Alex" })).await.unwrap();

        let mut edit = first.to_value();
        edit["name"] = json!("Alexandra");
        let second = db.people().save(edit).await.unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.name(), Some("Alexandra"));
        assert!(second.updated_at() >= first.updated_at());
        assert_eq!(db.people().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_save_leaves_state_untouched() {
        let db = setup().await;
        let saved = db.categories().save(json!({ "name": "Therapy" })).await.unwrap();
        let generation = db.changes().generation();

        let mut bad = saved.to_value();
        bad["name"] = json!("x");
        let err = db.categories().save(bad).await.unwrap_err();

        assert!(matches!(err, DbError::Validation(ref v) if v.has_field("name")));
        assert_eq!(db.categories().get(saved.id()).await.unwrap(), saved);
        assert_eq!(db.changes().generation(), generation);
    }

    #[tokio::test]
    async fn test_stale_write_rejected() {
        let db = setup().await;
        let saved = db.people().save(json!({ "name": "Sam" })).await.unwrap();

        let mut stale = saved.to_value();
        stale["name"] = json!("Samuel");
        stale["updatedAt"] = json!("2000-01-01T00:00:00.000Z");

        let err = db.people().save(stale).await.unwrap_err();
        assert!(matches!(err, DbError::StaleWrite { .. }));
        assert_eq!(db.people().get(saved.id()).await.unwrap().name(), Some("Sam"));
    }

    #[tokio::test]
    async fn test_delete_is_a_tombstone() {
        let db = setup().await;
        let saved = db.people().save(json!({ "name": "Robin" })).await.unwrap();

        db.people().delete(saved.id()).await.unwrap();

        assert!(matches!(
            db.people().get(saved.id()).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(db.people().list(None).await.unwrap().is_empty());
        assert_eq!(db.people().count().await.unwrap(), 0);

        // Second delete is a no-op, unknown id is NotFound
        db.people().delete(saved.id()).await.unwrap();
        assert!(matches!(
            db.people().delete(PERSON).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filter() {
        let db = setup().await;
        let other_person = new_record_id();

        for (person, amount) in [(PERSON, 50), (other_person.as_str(), 75), (PERSON, 20)] {
            db.expenses()
                .save(json!({
                    "name": "Visit",
                    "personId": person,
                    "categoryId": CATEGORY,
                    "amount": amount,
                    "months": [1, 2, 3],
                }))
                .await
                .unwrap();
        }

        let mine = db
            .expenses()
            .list(Some(&ListFilter::new("personId", PERSON)))
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);

        let fifty = db
            .expenses()
            .list(Some(&ListFilter::new("amount", 50.0)))
            .await
            .unwrap();
        assert_eq!(fifty.len(), 1);
        assert_eq!(
            fifty[0].as_expense().unwrap().annual_total().to_string(),
            "$150.00"
        );

        // Id order is creation order
        let all = db.expenses().list(None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(Record::id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_mutations_raise_change_signal() {
        let db = setup().await;
        let mut rx = db.subscribe_changes();

        let saved = db.people().save(json!({ "name": "Kim" })).await.unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        db.people().delete(saved.id()).await.unwrap();
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_filter_matches() {
        let record = json!({ "amount": 50, "planId": null, "isInNetwork": true });

        assert!(ListFilter::new("amount", 50.0).matches(&record));
        assert!(ListFilter::new("isInNetwork", true).matches(&record));
        assert!(ListFilter::new("planId", Value::Null).matches(&record));
        assert!(ListFilter::new("categoryId", Value::Null).matches(&record));
        assert!(!ListFilter::new("categoryId", "x").matches(&record));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("planwise.db")))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let people = db.people();
                tokio::spawn(async move {
                    people.save(json!({ "name": format!("Person {i}") })).await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(db.people().count().await.unwrap(), 40);

        db.close().await;
    }
}
