//! TOL detection: lookahead scan over one trip's movement history.
//!
//! History events for a trip form a contiguous group. The scan walks the
//! group looking for an event that satisfies the header's TOL rule. If the
//! trip number changes or the stream ends first, the result is a TOL
//! failure. That is a business outcome, not an error.

use crate::cursor::StreamCursor;
use crate::error::Result;
use crate::record::{CycleHeader, HistoryEvent};
use crate::store::KeyedStore;
use log::debug;
use std::fmt;

/// Which events count as proof of a rule-5 receivable movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TolRule {
    /// Reload with a rate code extension: the event must be a rule-5
    /// receivable delivery.
    ReceivableDelivery,
    /// Any rule-5 receivable event.
    Receivable,
}

impl TolRule {
    pub fn for_header(header: &CycleHeader) -> Self {
        if header.reload && !header.rate_key.ext_is_blank() {
            TolRule::ReceivableDelivery
        } else {
            TolRule::Receivable
        }
    }

    pub fn qualifies(&self, event: &HistoryEvent) -> bool {
        match self {
            TolRule::ReceivableDelivery => event.tol_rule5_receivable && event.delivery,
            TolRule::Receivable => event.tol_rule5_receivable,
        }
    }
}

impl fmt::Display for TolRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TolRule::ReceivableDelivery => write!(f, "receivable delivery"),
            TolRule::Receivable => write!(f, "receivable"),
        }
    }
}

/// No qualifying event inside a trip's group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TolFailure {
    pub trip_number: u32,
    pub rule: TolRule,
    /// Events of the trip that were looked at and rejected.
    pub events_examined: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Satisfied(HistoryEvent),
    Failed(TolFailure),
}

/// Scan for one header: a trip number and the rule picked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventScanner {
    trip_number: u32,
    rule: TolRule,
}

impl EventScanner {
    pub fn new(trip_number: u32, rule: TolRule) -> Self {
        EventScanner { trip_number, rule }
    }

    pub fn for_header(header: &CycleHeader) -> Self {
        EventScanner::new(header.trip_number, TolRule::for_header(header))
    }

    pub fn trip_number(&self) -> u32 {
        self.trip_number
    }

    pub fn rule(&self) -> TolRule {
        self.rule
    }

    /// Moves the cursor past groups of lower trip numbers.
    ///
    /// Stops on the first event of the target trip, on a higher trip, or at
    /// end of stream. It never moves back.
    pub fn seek<S>(&self, cursor: &mut StreamCursor<S>) -> Result<()>
    where
        S: KeyedStore<Record = HistoryEvent>,
    {
        if cursor.current().is_none() && !cursor.is_exhausted() {
            cursor.next()?;
        }

        while cursor
            .current()
            .is_some_and(|ev| ev.trip_number < self.trip_number)
        {
            cursor.next()?;
        }
        Ok(())
    }

    /// Scans the trip's group from the cursor position.
    ///
    /// Calls `next` at most once per event of the group. On success the
    /// cursor stays on the qualifying event.
    pub fn scan<S>(&self, cursor: &mut StreamCursor<S>) -> Result<ScanOutcome>
    where
        S: KeyedStore<Record = HistoryEvent>,
    {
        if cursor.current().is_none() && !cursor.is_exhausted() {
            cursor.next()?;
        }

        let mut examined = 0;
        loop {
            match cursor.current() {
                Some(event) if event.trip_number == self.trip_number => {
                    if self.rule.qualifies(event) {
                        debug!(
                            "Trip {}: {} found at {}",
                            self.trip_number, self.rule, event.timestamp
                        );
                        return Ok(ScanOutcome::Satisfied(event.clone()));
                    }
                    examined += 1;
                    cursor.next()?;
                }
                _ => {
                    return Ok(ScanOutcome::Failed(TolFailure {
                        trip_number: self.trip_number,
                        rule: self.rule,
                        events_examined: examined,
                    }));
                }
            }
        }
    }
}
