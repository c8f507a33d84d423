//! # Snapshot and Restore
//!
//! Full export and import of every table, used by the backup engine.
//!
//! ## Backup Document
//! A JSON array of every record of every table, tombstones included:
//! ```json
//! [
//!   { "id": "0190…", "type": "plan", "name": "Gold PPO", "premium": 300, … },
//!   { "id": "0190…", "type": "person", "isDeleted": true, "name": "Old", … }
//! ]
//! ```
//!
//! ## Restore
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for table in [plan, person, category, expense, coverage]:             │
//! │     BEGIN IMMEDIATE                                                    │
//! │       DELETE FROM records WHERE table_name = table                     │
//! │       INSERT every snapshot record of that table (timestamps kept)     │
//! │     COMMIT            ← a failure rolls back this table only           │
//! │  ChangeSignal::notify_tables(replaced)   ← once per restore            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{SubsecRound, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::changes::ChangeSignal;
use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::records::decode;
use planwise_core::{format_timestamp, schema, Record, RecordType, TableName};

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time copy of every record, tombstones included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub records: Vec<Record>,
}

impl Snapshot {
    pub fn new(records: Vec<Record>) -> Self {
        Snapshot { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records of one table, in snapshot order.
    pub fn table(&self, table: TableName) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.table() == table)
    }

    /// Serializes to the backup document (a JSON array).
    pub fn to_document(&self) -> DbResult<String> {
        let values: Vec<Value> = self.records.iter().map(Record::to_value).collect();
        Ok(serde_json::to_string(&values)?)
    }

    /// Parses a backup document.
    ///
    /// Each entry's table comes from its `type`. Entries whose table cannot
    /// be resolved (including bare `"deleted"` markers from old backups) are
    /// skipped with a warning; an entry that resolves but fails validation
    /// fails the whole document.
    pub fn from_document(document: &str) -> DbResult<Snapshot> {
        let values: Vec<Value> = serde_json::from_str(document)?;

        let mut records = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let table = value
                .get("type")
                .and_then(Value::as_str)
                .and_then(|t| t.parse::<RecordType>().ok())
                .and_then(|t| t.table());

            let Some(table) = table else {
                warn!(index, "Skipping backup entry without a resolvable table");
                continue;
            };

            records.push(schema::parse(table, value)?);
        }

        Ok(Snapshot { records })
    }
}

// =============================================================================
// Snapshot Repository
// =============================================================================

/// Whole-dataset reads and writes.
#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    pool: SqlitePool,
    changes: ChangeSignal,
}

impl SnapshotRepository {
    pub fn new(pool: SqlitePool, changes: ChangeSignal) -> Self {
        SnapshotRepository { pool, changes }
    }

    /// Reads every record of every table in one statement.
    ///
    /// A single SELECT sees one consistent database state, so no save can
    /// be half-visible. Records come out table by table, each in id order.
    pub async fn snapshot_all(&self) -> DbResult<Snapshot> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT table_name, payload
            FROM records
            ORDER BY table_name ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_table: BTreeMap<TableName, Vec<Record>> = BTreeMap::new();
        for (table_name, payload) in rows {
            let table: TableName = table_name
                .parse()
                .map_err(|e| DbError::Serialization(format!("{e}")))?;
            let value: Value = serde_json::from_str(&payload)?;
            by_table.entry(table).or_default().push(decode(table, &value)?);
        }

        let records: Vec<Record> = by_table.into_values().flatten().collect();
        debug!(count = records.len(), "Snapshot taken");
        Ok(Snapshot { records })
    }

    /// Replaces every table with the snapshot's contents.
    ///
    /// Each table is replaced in its own transaction. Records keep the
    /// `updatedAt` they carry; ones without it are stamped now.
    ///
    /// The change signal is raised once, after the last table. If a table
    /// fails, the tables committed before it stay replaced and still raise
    /// the signal.
    pub async fn restore(&self, snapshot: &Snapshot) -> DbResult<()> {
        info!(count = snapshot.len(), "Restoring snapshot");

        let mut replaced = Vec::with_capacity(TableName::ALL.len());
        let mut result = Ok(());
        for table in TableName::ALL {
            match self.restore_table(table, snapshot).await {
                Ok(restored) => {
                    debug!(table = %table, restored, "Table restored");
                    replaced.push(table);
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "Table restore rolled back");
                    result = Err(e);
                    break;
                }
            }
        }

        if !replaced.is_empty() {
            self.changes.notify_tables(&replaced);
        }

        if result.is_ok() {
            info!("Restore complete");
        }
        result
    }

    async fn restore_table(&self, table: TableName, snapshot: &Snapshot) -> DbResult<usize> {
        let now = Utc::now().trunc_subsecs(3);

        let mut tx = begin_write(&self.pool).await?;

        sqlx::query("DELETE FROM records WHERE table_name = ?1")
            .bind(table.as_str())
            .execute(&mut *tx)
            .await?;

        let mut count = 0;
        for record in snapshot.table(table) {
            let mut record = record.clone();
            let stamp = *record.meta.updated_at.get_or_insert(now);
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
            .bind(table.as_str())
            .bind(record.id())
            .bind(&payload)
            .bind(record.is_deleted())
            .bind(format_timestamp(&stamp))
            .execute(&mut *tx)
            .await?;

            count += 1;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
