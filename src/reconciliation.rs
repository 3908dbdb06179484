// ⚖️ Reconciliation Store
// Applies one parsed batch to the currencies table as a single transaction:
//   found by code  → update rate + updated_at in place
//   not found      → insert with a fresh identity
// Any failure rolls back the whole batch. Nothing partial is ever visible.

use crate::db::{
    find_currency_by_code, insert_currency, insert_event, setup_database, update_currency,
    CurrencyRecord, Event,
};
use crate::error::IngestError;
use crate::parser::RateRecord;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How long a cycle waits for another writer before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// RECONCILE SUMMARY
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl ReconcileSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

// ============================================================================
// RECONCILIATION STORE
// ============================================================================

/// Store handle scoped to one cycle: opened at cycle start, dropped at cycle end
pub struct ReconciliationStore {
    conn: Connection,
}

impl ReconciliationStore {
    /// Open (creating if needed) the SQLite database at `path`
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, IngestError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        setup_database(&conn)?;
        Ok(Self { conn })
    }

    /// Read access for queries outside the reconcile path
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Upsert every record by code, all-or-nothing
    ///
    /// An empty batch returns immediately without opening a transaction.
    /// `BEGIN IMMEDIATE` takes the write lock up front so overlapping
    /// reconciles serialize instead of deadlocking on lock upgrade.
    pub fn reconcile(&mut self, records: Vec<RateRecord>) -> Result<ReconcileSummary, IngestError> {
        if records.is_empty() {
            debug!("empty batch, nothing to reconcile");
            return Ok(ReconcileSummary::default());
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        match apply_batch(&tx, &records) {
            Ok(summary) => {
                tx.commit()?;
                debug!(inserted = summary.inserted, updated = summary.updated, "batch committed");
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, records = records.len(), "batch failed, rolling back");
                if let Err(rollback_err) = tx.rollback() {
                    error!(error = %rollback_err, "rollback failed");
                }
                Err(e.into())
            }
        }
    }

    /// Append an audit event outside any batch transaction
    ///
    /// Best-effort: callers log the error and move on.
    pub fn record_event(&self, event: &Event) -> Result<(), IngestError> {
        insert_event(&self.conn, event)?;
        Ok(())
    }
}

fn apply_batch(tx: &Transaction, records: &[RateRecord]) -> rusqlite::Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();

    for record in records {
        match find_currency_by_code(tx, &record.code)? {
            Some(mut existing) => {
                existing.rate = record.per_unit_rate;
                existing.updated_at = record.observed_at;
                update_currency(tx, &existing)?;
                summary.updated += 1;
            }
            None => {
                let currency =
                    CurrencyRecord::new(&record.code, record.per_unit_rate, record.observed_at);
                insert_currency(tx, &currency)?;
                summary.inserted += 1;
            }
        }
    }

    Ok(summary)
}
