// 📤 CSV export of stored rates

use crate::db::{get_all_currencies, CurrencyRecord};
use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    code: &'a str,
    rate: String,
    updated_at: String,
}

impl<'a> From<&'a CurrencyRecord> for ExportRow<'a> {
    fn from(currency: &'a CurrencyRecord) -> Self {
        Self {
            code: &currency.code,
            rate: currency.rate.to_string(),
            updated_at: currency.updated_at.to_rfc3339(),
        }
    }
}

/// Write every stored currency as `code,rate,updated_at` rows, sorted by code
pub fn write_rates_csv<W: Write>(conn: &Connection, writer: W) -> Result<usize> {
    let currencies = get_all_currencies(conn).context("Failed to read currencies")?;
    let mut wtr = csv::Writer::from_writer(writer);

    for currency in &currencies {
        wtr.serialize(ExportRow::from(currency))
            .with_context(|| format!("Failed to write row for {}", currency.code))?;
    }

    wtr.flush().context("Failed to flush CSV output")?;
    Ok(currencies.len())
}

pub fn export_rates_csv(conn: &Connection, path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_rates_csv(conn, file)
}
