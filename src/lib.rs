// Rate Tracker - Exchange-Rate Ingestion Worker
// Exposes the pipeline stages for the CLI binary and integration tests
//
//   Scheduler ──► Fetcher ──► Decoder ──► Parser ──► ReconciliationStore
//                (HTTP)      (cp1251)    (XML)      (SQLite, one txn)

pub mod config;
pub mod db;
pub mod decoder;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod parser;
pub mod pipeline;
pub mod reconciliation;
pub mod scheduler;

// Re-export commonly used types
pub use config::Config;
pub use db::{
    CurrencyRecord, Event,
    setup_database, find_currency_by_code, insert_currency, update_currency,
    get_all_currencies, verify_count, insert_event, get_events_for_entity, last_event_of_type,
};
pub use decoder::{decode_feed, FEED_ENCODING};
pub use error::IngestError;
pub use export::{export_rates_csv, write_rates_csv};
pub use fetcher::{FeedSource, HttpFeedFetcher};
pub use parser::{parse_rates, parse_rates_at, parse_localized_decimal, per_unit_rate, RateRecord};
pub use pipeline::{CycleReport, IngestionPipeline, SYNC_EVENT};
pub use reconciliation::{ReconcileSummary, ReconciliationStore};
pub use scheduler::{CycleRunner, IngestionScheduler, SchedulerState, SchedulerStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
