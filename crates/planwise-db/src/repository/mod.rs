//! # Repository Module
//!
//! Database repositories for Planwise.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  UI shell / sync engine                                                │
//! │       │                                                                 │
//! │       │  db.expenses().list(Some(&ListFilter::new("personId", p)))     │
//! │       ▼                                                                 │
//! │  TableStore (one per table)        SnapshotRepository                  │
//! │  ├── get(id)                       ├── snapshot_all()                  │
//! │  ├── list(filter)                  └── restore(snapshot)               │
//! │  ├── save(raw)                                                         │
//! │  ├── delete(id)                    SettingsRepository                  │
//! │  └── count()                       ├── get_json / set_json            │
//! │       │                            └── remove                          │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite (records, settings)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod records;
pub mod settings;
pub mod snapshot;
