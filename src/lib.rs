//! # Reclaim Cycle
//!
//! A sequential matching engine for equipment reclaim accounting cycles.
//! For every cycle header of a carrier it resolves the reclaim rate that
//! applies in the job's service month. It then checks the trip's movement
//! history for a qualifying rule-5 receivable event (TOL detection).
//!
//! ## Design Principles
//!
//! - **Forward-only cursors**: each stream is read once, in key order
//! - **Merge-join rates**: superseded rate generations are skipped in place
//! - **Bounded group scans**: a TOL scan never leaves its trip's events
//! - **Outcomes, not errors**: missing rates and TOL failures are recorded
//!   per header, and only store failures abort a run
//!
//! ## Example
//!
//! ```no_run
//! use reclaim_cycle::{run_cycle, JobConfig, MemoryStore, ServiceMonth};
//! use reclaim_cycle::record::{HeaderRow, HistoryRow, RateRow};
//! use std::io::Cursor;
//! use std::str::FromStr;
//!
//! let headers = MemoryStore::from_csv(
//!     Cursor::new("owner,cycle,trip,rate_code,rate_code_ext,reload\nUP,C1,500,A,,N\n"),
//!     HeaderRow::parse,
//! ).unwrap();
//! let rates = MemoryStore::from_csv(
//!     Cursor::new("owner,rate_code,rate_code_ext,effective,expire,rate,description\nUP,A,,200101,999912,1.25,box\n"),
//!     RateRow::parse,
//! ).unwrap();
//! let history = MemoryStore::from_csv(
//!     Cursor::new("owner,trip,rule5_receivable,delivery,event_type,timestamp\n"),
//!     HistoryRow::parse,
//! ).unwrap();
//!
//! let config = JobConfig::new("UP", ServiceMonth::from_str("200203").unwrap(), "2");
//! let result = run_cycle(config, headers, rates, history);
//! reclaim_cycle::write_outcomes(&result, std::io::stdout()).unwrap();
//! ```

pub mod cursor;
pub mod driver;
pub mod error;
pub mod outcome;
pub mod rate;
pub mod record;
pub mod resolver;
pub mod scanner;
pub mod store;

pub use cursor::StreamCursor;
pub use driver::{run_cycle, AbortSignal, CycleDriver, CycleState, JobConfig};
pub use error::{CycleError, Result};
pub use outcome::{
    write_outcomes, FailureReason, FollowUp, HeaderOutcome, MatchOutcome, RetrievalMode,
    RunResult, TolStatus,
};
pub use rate::ReclaimRate;
pub use record::{CycleHeader, HistoryEvent, Phase, RateKey, RateRecord, ServiceMonth};
pub use resolver::{NoMatchReason, RateMatch, RateResolver};
pub use scanner::{EventScanner, ScanOutcome, TolFailure, TolRule};
pub use store::{Fetch, KeyedStore, MemoryStore, StreamHandle, StreamRecord};
