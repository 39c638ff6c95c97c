//! Stream record models for CSV parsing and internal representation.
//!
//! Each of the three streams has a raw row type (as read from CSV) and a
//! typed record that the cursors hand out. Legacy fixed-width fields are
//! blank padded, so text keys are compared with trailing blanks removed.

use crate::error::{CycleError, Result};
use crate::rate::ReclaimRate;
use crate::store::StreamRecord;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Accounting month in `YYYYMM` form.
///
/// `999912` is a valid month and is used on rate rows that never expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceMonth(u32);

impl ServiceMonth {
    /// Builds a month from a `YYYYMM` integer, rejecting month numbers outside 01-12.
    pub fn from_yyyymm(value: u32) -> Option<Self> {
        let month = value % 100;
        let year = value / 100;
        if (1..=12).contains(&month) && (1..=9999).contains(&year) {
            Some(ServiceMonth(value))
        } else {
            None
        }
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl FromStr for ServiceMonth {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || CycleError::Validation(format!("invalid service month '{}'", trimmed));
        if trimmed.len() != 6 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let value: u32 = trimmed.parse().map_err(|_| invalid())?;
        ServiceMonth::from_yyyymm(value).ok_or_else(invalid)
    }
}

impl fmt::Display for ServiceMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// Job phase. Phase 1 also calibrates against the `MAX` rate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    One,
    Two,
}

impl FromStr for Phase {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(Phase::One),
            "2" => Ok(Phase::Two),
            _ => Err(CycleError::Validation("missing phase".to_string())),
        }
    }
}

/// Composite rate key: rate code, then rate code extension.
///
/// Ordering is lexicographic on the code first and the extension second,
/// which is the order of the rate master.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RateKey {
    pub code: String,
    pub ext: String,
}

impl RateKey {
    pub fn new(code: &str, ext: &str) -> Self {
        RateKey {
            code: code.trim_end().to_string(),
            ext: ext.trim_end().to_string(),
        }
    }

    /// Returns `true` when the header carries no rate code extension.
    pub fn ext_is_blank(&self) -> bool {
        self.ext.is_empty()
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.code, self.ext)
    }
}

/// Parses a Y/N indicator field. Also accepts `true`/`false` and `1`/`0`.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "Y" | "YES" | "TRUE" | "1" => Some(true),
        "N" | "NO" | "FALSE" | "0" | "" => Some(false),
        _ => None,
    }
}

fn flag_field(stream: &'static str, row: usize, name: &str, raw: &str) -> Result<bool> {
    parse_flag(raw).ok_or_else(|| CycleError::InvalidRecord {
        stream,
        row,
        message: format!("{} must be Y or N, got '{}'", name, raw.trim()),
    })
}

fn month_field(stream: &'static str, row: usize, name: &str, raw: &str) -> Result<ServiceMonth> {
    ServiceMonth::from_str(raw).map_err(|_| CycleError::InvalidRecord {
        stream,
        row,
        message: format!("{} is not a YYYYMM month: '{}'", name, raw.trim()),
    })
}

// ---------------------------------------------------------------------------
// Cycle headers
// ---------------------------------------------------------------------------

/// Raw cycle header row as read from CSV.
#[derive(Debug, Deserialize)]
pub struct HeaderRow {
    pub owner: String,
    pub cycle: String,
    pub trip: u32,
    pub rate_code: String,
    pub rate_code_ext: Option<String>,
    pub reload: String,
}

impl HeaderRow {
    /// Converts the raw row into a typed [`CycleHeader`]. `row` is used for error reporting.
    pub fn parse(&self, row: usize) -> Result<CycleHeader> {
        Ok(CycleHeader {
            owner_key: self.owner.trim().to_string(),
            cycle_key: self.cycle.trim().to_string(),
            trip_number: self.trip,
            rate_key: RateKey::new(
                self.rate_code.trim_start(),
                self.rate_code_ext.as_deref().unwrap_or("").trim_start(),
            ),
            reload: flag_field(CycleHeader::STREAM, row, "reload", &self.reload)?,
        })
    }
}

/// One cycle entity. Headers are ordered by cycle key within an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleHeader {
    pub owner_key: String,
    pub cycle_key: String,
    pub trip_number: u32,
    pub rate_key: RateKey,
    pub reload: bool,
}

impl StreamRecord for CycleHeader {
    type Key = String;
    const STREAM: &'static str = "cycle header";

    fn owner_key(&self) -> &str {
        &self.owner_key
    }

    fn stream_key(&self) -> String {
        self.cycle_key.clone()
    }
}

// ---------------------------------------------------------------------------
// Reclaim rate master
// ---------------------------------------------------------------------------

/// Raw reclaim rate master row as read from CSV.
#[derive(Debug, Deserialize)]
pub struct RateRow {
    pub owner: String,
    pub rate_code: String,
    pub rate_code_ext: Option<String>,
    pub effective: String,
    pub expire: String,
    pub rate: ReclaimRate,
    pub description: Option<String>,
}

impl RateRow {
    pub fn parse(&self, row: usize) -> Result<RateRecord> {
        let stream = RateRecord::STREAM;
        let effective_month = month_field(stream, row, "effective", &self.effective)?;
        let expire_month = month_field(stream, row, "expire", &self.expire)?;
        if expire_month < effective_month {
            return Err(CycleError::InvalidRecord {
                stream,
                row,
                message: format!(
                    "window {}-{} expires before it takes effect",
                    effective_month, expire_month
                ),
            });
        }

        Ok(RateRecord {
            owner_key: self.owner.trim().to_string(),
            key: RateKey::new(
                self.rate_code.trim_start(),
                self.rate_code_ext.as_deref().unwrap_or("").trim_start(),
            ),
            effective_month,
            expire_month,
            rate: self.rate,
            description: self
                .description
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string(),
        })
    }
}

/// One generation of a reclaim rate.
///
/// The master may hold several generations of one key, ordered by
/// increasing effective month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRecord {
    pub owner_key: String,
    pub key: RateKey,
    pub effective_month: ServiceMonth,
    pub expire_month: ServiceMonth,
    pub rate: ReclaimRate,
    pub description: String,
}

impl RateRecord {
    /// Returns `true` when `month` falls inside the inclusive effective/expire window.
    pub fn applies_to(&self, month: ServiceMonth) -> bool {
        self.effective_month <= month && month <= self.expire_month
    }
}

impl StreamRecord for RateRecord {
    type Key = (RateKey, ServiceMonth);
    const STREAM: &'static str = "rate master";

    fn owner_key(&self) -> &str {
        &self.owner_key
    }

    fn stream_key(&self) -> Self::Key {
        (self.key.clone(), self.effective_month)
    }
}

// ---------------------------------------------------------------------------
// Equipment movement history
// ---------------------------------------------------------------------------

/// Raw movement history row as read from CSV.
#[derive(Debug, Deserialize)]
pub struct HistoryRow {
    pub owner: String,
    pub trip: u32,
    pub rule5_receivable: String,
    pub delivery: String,
    pub event_type: Option<String>,
    pub timestamp: String,
}

impl HistoryRow {
    pub fn parse(&self, row: usize) -> Result<HistoryEvent> {
        let stream = HistoryEvent::STREAM;
        Ok(HistoryEvent {
            owner_key: self.owner.trim().to_string(),
            trip_number: self.trip,
            tol_rule5_receivable: flag_field(
                stream,
                row,
                "rule5_receivable",
                &self.rule5_receivable,
            )?,
            delivery: flag_field(stream, row, "delivery", &self.delivery)?,
            event_type: self.event_type.as_deref().unwrap_or("").trim().to_string(),
            timestamp: self.timestamp.trim().to_string(),
        })
    }
}

/// One movement event. Events of one trip form a contiguous group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub owner_key: String,
    pub trip_number: u32,
    /// Receivable under TOL rule 5.
    pub tol_rule5_receivable: bool,
    pub delivery: bool,
    pub event_type: String,
    pub timestamp: String,
}

impl StreamRecord for HistoryEvent {
    type Key = (u32, String);
    const STREAM: &'static str = "movement history";

    fn owner_key(&self) -> &str {
        &self.owner_key
    }

    fn stream_key(&self) -> Self::Key {
        (self.trip_number, self.timestamp.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_month_parse() {
        let m = ServiceMonth::from_str("200203").unwrap();
        assert_eq!(m.as_u32(), 200203);
        assert_eq!(m.to_string(), "200203");
        assert!(ServiceMonth::from_str(" 999912 ").is_ok());
    }

    #[test]
    fn test_service_month_rejects_bad_month() {
        assert!(ServiceMonth::from_str("200213").is_err());
        assert!(ServiceMonth::from_str("200200").is_err());
        assert!(ServiceMonth::from_str("20021").is_err());
        assert!(ServiceMonth::from_str("2002-1").is_err());
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!(Phase::from_str("1").unwrap(), Phase::One);
        assert_eq!(Phase::from_str(" 2 ").unwrap(), Phase::Two);
        let err = Phase::from_str("3").unwrap_err();
        assert_eq!(err.to_string(), "validation failure: missing phase");
    }

    #[test]
    fn test_rate_key_ignores_trailing_blanks() {
        assert_eq!(RateKey::new("A", "MAX "), RateKey::new("A", "MAX"));
        assert!(RateKey::new("A", "   ").ext_is_blank());
    }

    #[test]
    fn test_rate_key_ordering() {
        assert!(RateKey::new("A", "EXT2") < RateKey::new("B", ""));
        assert!(RateKey::new("A", "") < RateKey::new("A", "EXT1"));
        assert!(RateKey::new("A", "EXT1") < RateKey::new("A", "EXT2"));
    }

    #[test]
    fn test_parse_header_row() {
        let row = HeaderRow {
            owner: " UP ".to_string(),
            cycle: "C0001".to_string(),
            trip: 500,
            rate_code: "A".to_string(),
            rate_code_ext: Some("EXT1 ".to_string()),
            reload: "Y".to_string(),
        };

        let header = row.parse(2).unwrap();
        assert_eq!(header.owner_key, "UP");
        assert_eq!(header.rate_key, RateKey::new("A", "EXT1"));
        assert!(header.reload);
    }

    #[test]
    fn test_parse_header_rejects_bad_flag() {
        let row = HeaderRow {
            owner: "UP".to_string(),
            cycle: "C0001".to_string(),
            trip: 500,
            rate_code: "A".to_string(),
            rate_code_ext: None,
            reload: "maybe".to_string(),
        };

        match row.parse(7) {
            Err(CycleError::InvalidRecord { row, .. }) => assert_eq!(row, 7),
            other => panic!("Expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rate_row_window() {
        let row = RateRow {
            owner: "UP".to_string(),
            rate_code: "A".to_string(),
            rate_code_ext: Some("EXT1".to_string()),
            effective: "200101".to_string(),
            expire: "200112".to_string(),
            rate: ReclaimRate::from_str("0.75").unwrap(),
            description: Some("box car".to_string()),
        };

        let rate = row.parse(2).unwrap();
        assert!(rate.applies_to(ServiceMonth::from_str("200101").unwrap()));
        assert!(rate.applies_to(ServiceMonth::from_str("200112").unwrap()));
        assert!(!rate.applies_to(ServiceMonth::from_str("200201").unwrap()));
        assert_eq!(rate.rate.to_string(), "0.7500");
    }

    #[test]
    fn test_parse_rate_row_rejects_inverted_window() {
        let row = RateRow {
            owner: "UP".to_string(),
            rate_code: "A".to_string(),
            rate_code_ext: None,
            effective: "200201".to_string(),
            expire: "200112".to_string(),
            rate: ReclaimRate::from_str("1").unwrap(),
            description: None,
        };

        assert!(row.parse(3).is_err());
    }

    #[test]
    fn test_rate_column_goes_through_serde() {
        use crate::store::MemoryStore;
        use std::io::Cursor;

        let header = "owner,rate_code,rate_code_ext,effective,expire,rate,description\n";
        let good = format!("{}UP,A,,200101,999912, 0.75 ,box\n", header);
        let store = MemoryStore::from_csv(Cursor::new(good), RateRow::parse).unwrap();
        assert_eq!(store.len(), 1);

        let bad = format!("{}UP,A,,200101,999912,cheap,box\n", header);
        match MemoryStore::from_csv(Cursor::new(bad), RateRow::parse) {
            Err(CycleError::InvalidRecord { stream, row, .. }) => {
                assert_eq!(stream, "rate master");
                assert_eq!(row, 2);
            }
            other => panic!("Expected InvalidRecord, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_parse_history_row() {
        let row = HistoryRow {
            owner: "UP".to_string(),
            trip: 500,
            rule5_receivable: "Y".to_string(),
            delivery: "N".to_string(),
            event_type: Some("PLCD".to_string()),
            timestamp: "2002-03-01T10:00".to_string(),
        };

        let event = row.parse(2).unwrap();
        assert!(event.tol_rule5_receivable);
        assert!(!event.delivery);
        assert_eq!(event.stream_key(), (500, "2002-03-01T10:00".to_string()));
    }
}
