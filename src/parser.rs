// 📄 Rate Parser
// Turns the decoded daily feed into normalized per-unit rate records.
//
// Feed shape:
//   <ValCurs Date="18.10.2026" name="Foreign Currency Market">
//     <Valute ID="R01820">
//       <NumCode>392</NumCode>
//       <CharCode>JPY</CharCode>
//       <Nominal>100</Nominal>
//       <Name>Японских иен</Name>
//       <Value>65,4321</Value>
//     </Valute>
//     ...
//   </ValCurs>
//
// Only a structurally broken document fails the parse. A bad <Valute> is
// skipped and the rest of the document still counts.

use crate::error::IngestError;
use chrono::{DateTime, Utc};
use roxmltree::{Document, Node, ParsingOptions};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Element names inside the feed
const RATE_ELEMENT: &str = "Valute";
const CODE_FIELD: &str = "CharCode";
const NAME_FIELD: &str = "Name";
const VALUE_FIELD: &str = "Value";
const NOMINAL_FIELD: &str = "Nominal";

/// One normalized rate, valid for a single cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RateRecord {
    /// Three-letter currency code (CharCode, not the display name)
    pub code: String,

    /// Rate for exactly one unit of the currency, always > 0
    pub per_unit_rate: Decimal,

    /// Processing time of the parse that produced this record
    pub observed_at: DateTime<Utc>,
}

/// Why a `<Valute>` element was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingField(&'static str),
    InvalidValue(String),
    InvalidNominal(String),
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a decoded feed, stamping every record with the current time
pub fn parse_rates(text: &str) -> Result<Vec<RateRecord>, IngestError> {
    parse_rates_at(text, Utc::now())
}

/// Parse a decoded feed with an explicit observation time
///
/// Duplicate codes collapse to the last occurrence, kept at the position of
/// the first one.
pub fn parse_rates_at(
    text: &str,
    observed_at: DateTime<Utc>,
) -> Result<Vec<RateRecord>, IngestError> {
    // A DOCTYPE line is legal in the feed; entities stay unresolved
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options)
        .map_err(|e| IngestError::MalformedDocument(e.to_string()))?;

    let mut records: Vec<RateRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for element in doc.descendants().filter(|n| n.has_tag_name(RATE_ELEMENT)) {
        let record = match extract_rate(element, observed_at) {
            Ok(record) => record,
            Err(reason) => {
                skipped += 1;
                warn!(
                    id = element.attribute("ID").unwrap_or("?"),
                    reason = ?reason,
                    "skipping rate element"
                );
                continue;
            }
        };

        match positions.get(&record.code) {
            Some(&idx) => {
                warn!(code = %record.code, "duplicate currency code in feed, last occurrence wins");
                records[idx] = record;
            }
            None => {
                positions.insert(record.code.clone(), records.len());
                records.push(record);
            }
        }
    }

    debug!(parsed = records.len(), skipped, "feed parsed");
    Ok(records)
}

/// Pull one rate out of a `<Valute>` element
fn extract_rate(element: Node, observed_at: DateTime<Utc>) -> Result<RateRecord, SkipReason> {
    let code = child_text(element, CODE_FIELD).ok_or(SkipReason::MissingField(CODE_FIELD))?;
    // Display name is required for the element to count, but not stored
    child_text(element, NAME_FIELD).ok_or(SkipReason::MissingField(NAME_FIELD))?;
    let raw_value = child_text(element, VALUE_FIELD).ok_or(SkipReason::MissingField(VALUE_FIELD))?;
    let raw_nominal =
        child_text(element, NOMINAL_FIELD).ok_or(SkipReason::MissingField(NOMINAL_FIELD))?;

    let value = parse_localized_decimal(&raw_value)
        .filter(|v| v.is_sign_positive() && !v.is_zero())
        .ok_or(SkipReason::InvalidValue(raw_value))?;

    let nominal: i64 = raw_nominal
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or(SkipReason::InvalidNominal(raw_nominal))?;

    Ok(RateRecord {
        code,
        per_unit_rate: per_unit_rate(value, nominal),
        observed_at,
    })
}

/// Trimmed, non-empty text of the first child element named `name`
///
/// All text nodes under the field are joined, so a comment or processing
/// instruction inside `<Value>` does not cut the number short.
fn child_text(element: Node, name: &str) -> Option<String> {
    let field = element.children().find(|c| c.has_tag_name(name))?;
    let text: String = field
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();

    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Parse a number written with a decimal comma ("90,1234") or point ("90.1234")
pub fn parse_localized_decimal(raw: &str) -> Option<Decimal> {
    let normalized = raw.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }

    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// Rate for one unit when the feed quotes per `nominal` units
///
/// JPY is quoted per 100 units: 65.4321 per 100 → 0.654321 per unit.
pub fn per_unit_rate(value: Decimal, nominal: i64) -> Decimal {
    if nominal > 1 {
        value / Decimal::from(nominal)
    } else {
        value
    }
}
