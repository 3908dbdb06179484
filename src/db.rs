use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Persistent currency row, one per currency code
/// Identity (id) never changes; rate and updated_at move on every sighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRecord {
    // ========================================================================
    // IDENTITY (assigned once, on first sighting)
    // ========================================================================
    /// Stable identity (UUID v4)
    pub id: String,

    /// Three-letter currency code, unique across the table
    pub code: String,

    // ========================================================================
    // VALUES (overwritten in place by every reconcile)
    // ========================================================================
    /// Rate per exactly one unit of the currency
    pub rate: Decimal,

    /// Processing time of the cycle that last wrote this row
    pub updated_at: DateTime<Utc>,
}

impl CurrencyRecord {
    /// New row with a freshly assigned identity
    pub fn new(code: &str, rate: Decimal, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.to_string(),
            rate,
            updated_at,
        }
    }
}

/// Event for the sync audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // WAL lets readers (list/export) run while a cycle holds the write lock
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Currencies Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS currencies (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            code TEXT UNIQUE NOT NULL,
            rate TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (sync audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CURRENCY ACCESS
// ============================================================================

/// Look up a currency row by code
pub fn find_currency_by_code(conn: &Connection, code: &str) -> rusqlite::Result<Option<CurrencyRecord>> {
    conn.query_row(
        "SELECT id, code, rate, updated_at FROM currencies WHERE code = ?1",
        [code],
        currency_from_row,
    )
    .optional()
}

/// Insert a new currency row; a second row with the same code violates the UNIQUE constraint
pub fn insert_currency(conn: &Connection, currency: &CurrencyRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO currencies (id, code, rate, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            currency.id,
            currency.code,
            currency.rate.to_string(),
            format_timestamp(&currency.updated_at),
        ],
    )?;

    Ok(())
}

/// Overwrite rate and updated_at of an existing row, matched by id
pub fn update_currency(conn: &Connection, currency: &CurrencyRecord) -> rusqlite::Result<()> {
    let changed = conn.execute(
        "UPDATE currencies SET rate = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            currency.rate.to_string(),
            format_timestamp(&currency.updated_at),
            currency.id,
        ],
    )?;

    if changed == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }

    Ok(())
}

pub fn get_all_currencies(conn: &Connection) -> rusqlite::Result<Vec<CurrencyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, rate, updated_at
         FROM currencies
         ORDER BY code",
    )?;

    let currencies = stmt
        .query_map([], currency_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(currencies)
}

pub fn verify_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM currencies", [], |row| row.get(0))
}

fn currency_from_row(row: &Row) -> rusqlite::Result<CurrencyRecord> {
    let rate_str: String = row.get(2)?;
    let updated_at_str: String = row.get(3)?;

    Ok(CurrencyRecord {
        id: row.get(0)?,
        code: row.get(1)?,
        rate: Decimal::from_str(&rate_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        updated_at: parse_timestamp(3, &updated_at_str)?,
    })
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> rusqlite::Result<()> {
    let data_json = event.data.to_string();

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            format_timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> rusqlite::Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Most recent event of a given type, across all entities
pub fn last_event_of_type(conn: &Connection, event_type: &str) -> rusqlite::Result<Option<Event>> {
    conn.query_row(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE event_type = ?1
         ORDER BY timestamp DESC, id DESC
         LIMIT 1",
        [event_type],
        event_from_row,
    )
    .optional()
}

fn event_from_row(row: &Row) -> rusqlite::Result<Event> {
    let timestamp_str: String = row.get(1)?;
    let data_json: String = row.get(5)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: parse_timestamp(1, &timestamp_str)?,
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data: serde_json::from_str(&data_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        actor: row.get(6)?,
    })
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Fixed-width RFC 3339 so TEXT ordering matches time ordering
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
