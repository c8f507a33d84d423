//! # Dataset Change Signal
//!
//! The only coupling between the table store and the sync engine.
//!
//! ```text
//! TableStore::save ──┐
//! TableStore::delete ├──► ChangeSignal::notify() ──► generation += 1
//! restore()  ────────┘                                  │
//!                                          watch::Receiver<u64>
//!                                                       │
//!                                             SyncEngine re-arms debounce
//! ```
//!
//! A `watch` channel keeps only the latest generation, so a slow observer
//! sees "something changed" once instead of queuing one event per write.
//! A restore counts as one mutation however many tables it replaced.

use std::sync::Arc;

use planwise_core::TableName;
use tokio::sync::watch;
use tracing::trace;

/// Generation counter bumped after every committed mutation.
#[derive(Debug, Clone)]
pub struct ChangeSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        ChangeSignal { tx: Arc::new(tx) }
    }

    /// Records a committed mutation of `table`.
    ///
    /// Works with zero subscribers; `send_modify` never fails.
    pub fn notify(&self, table: TableName) {
        self.tx.send_modify(|generation| *generation += 1);
        trace!(table = %table, generation = *self.tx.borrow(), "Dataset modified");
    }

    /// Records one committed mutation spanning several tables.
    pub fn notify_tables(&self, tables: &[TableName]) {
        self.tx.send_modify(|generation| *generation += 1);
        trace!(?tables, generation = *self.tx.borrow(), "Dataset modified");
    }

    /// Returns a receiver that observes future generations.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Current generation. Zero until the first mutation.
    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_without_subscribers() {
        let signal = ChangeSignal::new();
        signal.notify(TableName::Plan);
        signal.notify(TableName::Plan);
        assert_eq!(signal.generation(), 2);
    }

    #[tokio::test]
    async fn test_subscriber_sees_latest_generation() {
        let signal = ChangeSignal::new();
        let mut rx = signal.subscribe();

        signal.notify(TableName::Expense);
        signal.notify(TableName::Person);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_multi_table_change_is_one_generation() {
        let signal = ChangeSignal::new();
        signal.notify_tables(&TableName::ALL);
        assert_eq!(signal.generation(), 1);
    }
}
