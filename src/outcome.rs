//! Per-header outcomes and the result of a whole cycle run.

use crate::error::Result;
use crate::record::{CycleHeader, HistoryEvent, RateRecord};
use crate::resolver::NoMatchReason;
use crate::scanner::TolFailure;
use std::io::Write;

/// TOL state of a header whose rate resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TolStatus {
    /// The job does not run TOL detection (neither voluntary nor estimate trip).
    NotApplicable,
    /// The qualifying movement event.
    Satisfied(HistoryEvent),
}

/// Why a header could not be settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NoMatch(NoMatchReason),
    /// The orchestration layer owns the follow-up for these.
    TolFailure(TolFailure),
}

impl FailureReason {
    pub fn describe(&self) -> String {
        match self {
            FailureReason::NoMatch(reason) => reason.as_str().to_string(),
            FailureReason::TolFailure(f) => format!(
                "no {} event for trip {} ({} examined)",
                f.rule, f.trip_number, f.events_examined
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Resolved { rate: RateRecord, tol: TolStatus },
    Failed { reason: FailureReason },
}

impl MatchOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, MatchOutcome::Resolved { .. })
    }
}

/// One header and what became of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOutcome {
    pub header: CycleHeader,
    pub outcome: MatchOutcome,
}

/// Which rate tables the downstream steps should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// The service month predates the modifications effective month.
    Historical,
    Current,
}

/// Follow-up programs a successful phase 1 run asks the caller to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// TOL participant running voluntary or estimate trips.
    SecondaryReclaim,
    /// The rate master carries a `MAX` sentinel row.
    FifthReclaim,
}

/// Everything a cycle run produced.
///
/// Outcomes are in header-stream order, one per header read before the run
/// ended. An aborted run keeps the outcomes recorded up to the abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub outcomes: Vec<HeaderOutcome>,
    pub aborted: bool,
    pub abort_reason: Option<String>,
    /// The `MAX` sentinel row found during phase 1 housekeeping.
    pub max_reclaim: Option<RateRecord>,
    pub follow_ups: Vec<FollowUp>,
    pub retrieval_mode: RetrievalMode,
}

impl RunResult {
    pub fn resolved_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_resolved())
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.resolved_count()
    }

    /// Headers that failed TOL detection.
    pub fn tol_failures(&self) -> impl Iterator<Item = &HeaderOutcome> {
        self.outcomes.iter().filter(|o| {
            matches!(
                o.outcome,
                MatchOutcome::Failed {
                    reason: FailureReason::TolFailure(_)
                }
            )
        })
    }
}

/// Writes one CSV line per header outcome.
///
/// Rates are written with exactly 4 decimal places. Failed headers leave
/// the rate column empty and carry the reason.
pub fn write_outcomes<W: Write>(result: &RunResult, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "cycle",
        "trip",
        "rate_code",
        "rate_code_ext",
        "status",
        "rate",
        "tol",
        "reason",
    ])?;

    for entry in &result.outcomes {
        let header = &entry.header;
        let (status, rate, tol, reason) = match &entry.outcome {
            MatchOutcome::Resolved { rate, tol } => {
                let tol = match tol {
                    TolStatus::NotApplicable => "n/a".to_string(),
                    TolStatus::Satisfied(event) => format!("satisfied@{}", event.timestamp),
                };
                ("resolved", rate.rate.to_string(), tol, String::new())
            }
            MatchOutcome::Failed { reason } => {
                let tol = match reason {
                    FailureReason::TolFailure(_) => "failed",
                    FailureReason::NoMatch(_) => "",
                };
                ("failed", String::new(), tol.to_string(), reason.describe())
            }
        };

        csv_writer.write_record([
            header.cycle_key.clone(),
            header.trip_number.to_string(),
            header.rate_key.code.clone(),
            header.rate_key.ext.clone(),
            status.to_string(),
            rate,
            tol,
            reason,
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
