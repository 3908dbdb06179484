// 🔁 Ingestion Pipeline
// One cycle: fetch → decode → parse → reconcile, in that order, nothing shared
// between cycles except the database file.

use crate::db::Event;
use crate::decoder::decode_feed;
use crate::error::IngestError;
use crate::fetcher::FeedSource;
use crate::parser::parse_rates;
use crate::reconciliation::{ReconcileSummary, ReconciliationStore};
use crate::scheduler::CycleRunner;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Audit event type appended after every committed cycle
pub const SYNC_EVENT: &str = "rates_synced";

const ACTOR: &str = "ingestion_worker";

/// What one successful cycle did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Size of the raw payload
    pub bytes: usize,
    /// SHA-256 of the raw payload, hex
    pub digest: String,
    /// Records that survived parsing
    pub parsed: usize,
    pub summary: ReconcileSummary,
    pub elapsed_ms: u64,
}

pub struct IngestionPipeline {
    source: Box<dyn FeedSource>,
    db_path: PathBuf,
}

impl IngestionPipeline {
    pub fn new(source: Box<dyn FeedSource>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run a single cycle end to end
    ///
    /// The store handle lives only inside this call: it is opened after the
    /// feed parsed cleanly and dropped (committed or rolled back) on return.
    pub async fn run_once(&self) -> Result<CycleReport, IngestError> {
        let started = Instant::now();

        let raw = self.source.fetch().await?;
        let digest = payload_digest(&raw);
        let text = decode_feed(&raw)?;
        let records = parse_rates(&text)?;
        let parsed = records.len();

        if parsed == 0 {
            warn!(url = self.source.endpoint(), "no currencies found in feed");
        }

        let mut store = ReconciliationStore::open(&self.db_path)?;
        let summary = store.reconcile(records)?;

        let report = CycleReport {
            bytes: raw.len(),
            digest,
            parsed,
            summary,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if parsed > 0 {
            if let Err(e) = self.record_sync(&store, &report) {
                warn!(error = %e, "failed to append sync event");
            }
        }

        info!(
            parsed = report.parsed,
            inserted = report.summary.inserted,
            updated = report.summary.updated,
            digest = %short_digest(&report.digest),
            elapsed_ms = report.elapsed_ms,
            "currency rates updated"
        );

        Ok(report)
    }

    /// Append the cycle report to the audit trail, after the batch committed
    fn record_sync(&self, store: &ReconciliationStore, report: &CycleReport) -> anyhow::Result<()> {
        let event = Event::new(
            SYNC_EVENT,
            "feed",
            self.source.endpoint(),
            serde_json::to_value(report)?,
            ACTOR,
        );
        store.record_event(&event)?;
        Ok(())
    }
}

#[async_trait]
impl CycleRunner for IngestionPipeline {
    async fn run_cycle(&self) -> Result<CycleReport, IngestError> {
        self.run_once().await
    }
}

fn payload_digest(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

fn short_digest(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}
