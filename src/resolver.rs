//! Rate resolution: a merge-join of headers against the rate master.
//!
//! The rate master is ordered by rate code, then extension, then effective
//! month. A code can carry several generations. Expired generations are
//! stepped over until one whose window covers the service month turns up.
//! The cursor never moves backward, so a run over headers with
//! non-decreasing rate keys reads each rate row at most once.

use crate::cursor::StreamCursor;
use crate::error::Result;
use crate::record::{RateKey, RateRecord, ServiceMonth};
use crate::store::KeyedStore;
use log::debug;
use std::cmp::Ordering;

/// Why no rate applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchReason {
    /// The rate master has no row for the key.
    NotOnFile,
    /// The first generation for the key starts after the service month.
    NotYetEffective,
    /// Every generation for the key expired before the service month.
    Expired,
}

impl NoMatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoMatchReason::NotOnFile => "rate not on file",
            NoMatchReason::NotYetEffective => "rate not yet effective",
            NoMatchReason::Expired => "rate expired",
        }
    }
}

/// Result of resolving one rate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateMatch {
    Resolved(RateRecord),
    NoMatch(NoMatchReason),
}

impl RateMatch {
    pub fn is_resolved(&self) -> bool {
        matches!(self, RateMatch::Resolved(_))
    }
}

/// Finds the applicable rate generation for a key in one service month.
#[derive(Debug, Clone, Copy)]
pub struct RateResolver {
    service_month: ServiceMonth,
}

impl RateResolver {
    pub fn new(service_month: ServiceMonth) -> Self {
        RateResolver { service_month }
    }

    /// Resolves `target` against the rate cursor.
    ///
    /// The cursor is left on the resolved row, on the first row past the
    /// key, or exhausted. It is never moved back. Headers with a rate key
    /// lower than the cursor position resolve to `NotOnFile`, so a caller
    /// whose keys go backward must rewind with [`StreamCursor::first`].
    pub fn resolve<S>(&self, cursor: &mut StreamCursor<S>, target: &RateKey) -> Result<RateMatch>
    where
        S: KeyedStore<Record = RateRecord>,
    {
        if cursor.current().is_none() && !cursor.is_exhausted() {
            cursor.next()?;
        }

        // Skip keys below the target.
        loop {
            let ordering = match cursor.current() {
                Some(rate) => rate.key.cmp(target),
                None => return Ok(RateMatch::NoMatch(NoMatchReason::NotOnFile)),
            };
            match ordering {
                Ordering::Less => {
                    cursor.next()?;
                }
                Ordering::Greater => return Ok(RateMatch::NoMatch(NoMatchReason::NotOnFile)),
                Ordering::Equal => break,
            }
        }

        // Same key: walk the generations.
        loop {
            let rate = match cursor.current() {
                Some(rate) if rate.key == *target => rate,
                _ => return Ok(RateMatch::NoMatch(NoMatchReason::Expired)),
            };

            if rate.applies_to(self.service_month) {
                return Ok(RateMatch::Resolved(rate.clone()));
            }
            if rate.effective_month > self.service_month {
                return Ok(RateMatch::NoMatch(NoMatchReason::NotYetEffective));
            }

            debug!(
                "Rate {} expired {}, skipping superseded generation",
                target, rate.expire_month
            );
            cursor.next()?;
        }
    }
}
