//! Cycle driver: walks the header stream and settles every header.
//!
//! A run goes `Init → Housekeeping → Looping → Closing → Done`. Any fatal
//! error, and any abort request, sends the run to `Closing` and then to
//! `Aborted`. Cursors are always closed before the result is returned.
//! Business failures (no rate, TOL failure) never stop the loop. They are
//! recorded as outcomes.

use crate::cursor::StreamCursor;
use crate::error::{CycleError, Result};
use crate::outcome::{
    FailureReason, FollowUp, HeaderOutcome, MatchOutcome, RetrievalMode, RunResult, TolStatus,
};
use crate::record::{CycleHeader, HistoryEvent, Phase, RateKey, RateRecord, ServiceMonth};
use crate::resolver::{NoMatchReason, RateMatch, RateResolver};
use crate::scanner::{EventScanner, ScanOutcome, TolRule};
use crate::store::{Fetch, KeyedStore, StreamRecord};
use log::{debug, error, info, warn};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rate code extension that marks the maximum reclaim row.
pub const MAX_RECLAIM_EXT: &str = "MAX";

/// Job options for one cycle run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Carrier/road whose partitions are processed.
    pub owner_key: String,
    pub service_month: ServiceMonth,
    /// Raw phase indicator, validated when the run starts.
    pub phase: String,
    pub tol_participant: bool,
    pub voluntary_trip: bool,
    pub estimate_trip: bool,
    /// Service months before this one are settled against historical tables.
    pub mods_effective_month: Option<ServiceMonth>,
    /// Set when an earlier program in the job stream aborted.
    ///
    /// The run then stops in `Init` and comes back as an aborted
    /// [`RunResult`] with reason `previously aborted in <program>`, rather
    /// than as an empty successful run. The CLI exits with status 2 for it.
    pub aborted_in_program: Option<String>,
}

impl JobConfig {
    pub fn new(owner_key: &str, service_month: ServiceMonth, phase: &str) -> Self {
        JobConfig {
            owner_key: owner_key.to_string(),
            service_month,
            phase: phase.to_string(),
            tol_participant: false,
            voluntary_trip: false,
            estimate_trip: false,
            mods_effective_month: None,
            aborted_in_program: None,
        }
    }

    /// TOL detection runs only for voluntary or estimate trips.
    pub fn tol_detection_applies(&self) -> bool {
        self.voluntary_trip || self.estimate_trip
    }

    pub fn retrieval_mode(&self) -> RetrievalMode {
        match self.mods_effective_month {
            Some(mods) if self.service_month < mods => RetrievalMode::Historical,
            _ => RetrievalMode::Current,
        }
    }
}

/// Cooperative abort request, checked between headers.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Init,
    Housekeeping,
    Looping,
    Closing,
    Done,
    Aborted,
}

/// Mutable state of one run. Dropped when the run returns.
#[derive(Debug)]
struct RunContext {
    state: CycleState,
    phase: Option<Phase>,
    /// Cleared when the rate master partition is empty.
    go_nogo: bool,
    /// Trip and rule of the last history scan.
    saved_trip: Option<u32>,
    saved_rule: Option<TolRule>,
    /// Rate key of the last header and what it resolved to.
    saved_rate: Option<(RateKey, RateMatch)>,
    max_reclaim: Option<RateRecord>,
    abort_reason: Option<String>,
    outcomes: Vec<HeaderOutcome>,
}

impl RunContext {
    fn new() -> Self {
        RunContext {
            state: CycleState::Init,
            phase: None,
            go_nogo: true,
            saved_trip: None,
            saved_rule: None,
            saved_rate: None,
            max_reclaim: None,
            abort_reason: None,
            outcomes: Vec::new(),
        }
    }

    fn enter(&mut self, state: CycleState) {
        info!("Cycle state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn is_aborting(&self) -> bool {
        self.abort_reason.is_some()
    }

    /// Records the first fatal condition. Later ones are only logged.
    fn fail(&mut self, reason: String) {
        error!("Processing aborted in {:?}: {}", self.state, reason);
        if self.abort_reason.is_none() {
            self.abort_reason = Some(reason);
        }
    }

    fn fail_with(&mut self, err: CycleError) {
        let reason = match err {
            CycleError::Validation(comment) => comment,
            other => other.to_string(),
        };
        self.fail(reason);
    }

    fn note_close(&mut self, stream: &str, result: Result<()>) {
        if let Err(e) = result {
            if self.is_aborting() {
                warn!("Closing {} during abort failed: {}", stream, e);
            } else {
                self.fail(format!("closing {} failed: {}", stream, e));
            }
        }
    }

    /// A trip lower than the last scanned one, or the same trip under a
    /// different rule, needs the history stream read again from the start.
    fn needs_history_rewind(&self, scanner: &EventScanner) -> bool {
        match (self.saved_trip, self.saved_rule) {
            (Some(trip), Some(rule)) => {
                scanner.trip_number() < trip
                    || (scanner.trip_number() == trip && scanner.rule() != rule)
            }
            _ => false,
        }
    }
}

struct Cursors<H: KeyedStore, R: KeyedStore, E: KeyedStore> {
    headers: StreamCursor<H>,
    rates: StreamCursor<R>,
    history: StreamCursor<E>,
}

enum Step<H: KeyedStore, R: KeyedStore, E: KeyedStore> {
    Init(H, R, E),
    Housekeeping(H, R, E),
    Looping(Cursors<H, R, E>),
    Closing(Option<Cursors<H, R, E>>),
    Finished,
}

/// Runs cycles for one job configuration.
pub struct CycleDriver {
    config: JobConfig,
    resolver: RateResolver,
    abort: AbortSignal,
    state: CycleState,
}

impl CycleDriver {
    pub fn new(config: JobConfig) -> Self {
        let resolver = RateResolver::new(config.service_month);
        CycleDriver {
            config,
            resolver,
            abort: AbortSignal::new(),
            state: CycleState::Init,
        }
    }

    /// Uses `signal` for cooperative cancellation instead of a private one.
    pub fn with_abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = signal;
        self
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// State the last run ended in: `Done` or `Aborted`.
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Runs one full cycle over the three streams.
    ///
    /// Never returns an error. Fatal conditions come back as
    /// `aborted == true` with a reason, after all cursors are closed.
    pub fn run<H, R, E>(&mut self, headers: H, rates: R, history: E) -> RunResult
    where
        H: KeyedStore<Record = CycleHeader>,
        R: KeyedStore<Record = RateRecord>,
        E: KeyedStore<Record = HistoryEvent>,
    {
        let mut ctx = RunContext::new();
        info!(
            "Starting cycle for {} service month {} phase '{}'",
            self.config.owner_key, self.config.service_month, self.config.phase
        );

        let mut step = Step::Init(headers, rates, history);
        loop {
            step = match step {
                Step::Init(h, r, e) => match self.init(&mut ctx) {
                    Ok(()) => Step::Housekeeping(h, r, e),
                    Err(err) => {
                        ctx.fail_with(err);
                        Step::Closing(None)
                    }
                },
                Step::Housekeeping(h, r, e) => {
                    ctx.enter(CycleState::Housekeeping);
                    match self.open_cursors(h, r, e) {
                        Ok(mut cursors) => match self.housekeeping(&mut ctx, &mut cursors) {
                            Ok(()) => Step::Looping(cursors),
                            Err(err) => {
                                ctx.fail_with(err);
                                Step::Closing(Some(cursors))
                            }
                        },
                        Err(err) => {
                            ctx.fail_with(err);
                            Step::Closing(None)
                        }
                    }
                }
                Step::Looping(mut cursors) => {
                    ctx.enter(CycleState::Looping);
                    if let Err(err) = self.looping(&mut ctx, &mut cursors) {
                        ctx.fail_with(err);
                    }
                    Step::Closing(Some(cursors))
                }
                Step::Closing(cursors) => {
                    ctx.enter(CycleState::Closing);
                    if let Some(mut cursors) = cursors {
                        Self::close_all(&mut ctx, &mut cursors);
                    }
                    if ctx.is_aborting() {
                        ctx.enter(CycleState::Aborted);
                    } else {
                        ctx.enter(CycleState::Done);
                    }
                    Step::Finished
                }
                Step::Finished => break,
            };
        }

        self.state = ctx.state;
        self.finish(ctx)
    }

    fn init(&self, ctx: &mut RunContext) -> Result<()> {
        if let Some(program) = &self.config.aborted_in_program {
            return Err(CycleError::Validation(format!(
                "previously aborted in {}",
                program
            )));
        }
        ctx.phase = Some(Phase::from_str(&self.config.phase)?);
        Ok(())
    }

    fn open_cursors<H, R, E>(&self, headers: H, rates: R, history: E) -> Result<Cursors<H, R, E>>
    where
        H: KeyedStore<Record = CycleHeader>,
        R: KeyedStore<Record = RateRecord>,
        E: KeyedStore<Record = HistoryEvent>,
    {
        let owner = &self.config.owner_key;
        info!("Opening streams for {}", owner);

        let mut header_cursor = StreamCursor::open(headers, owner)?;
        let mut rate_cursor = match StreamCursor::open(rates, owner) {
            Ok(c) => c,
            Err(e) => {
                close_quietly(&mut header_cursor);
                return Err(e);
            }
        };
        let history_cursor = match StreamCursor::open(history, owner) {
            Ok(c) => c,
            Err(e) => {
                close_quietly(&mut header_cursor);
                close_quietly(&mut rate_cursor);
                return Err(e);
            }
        };

        Ok(Cursors {
            headers: header_cursor,
            rates: rate_cursor,
            history: history_cursor,
        })
    }

    fn housekeeping<H, R, E>(&self, ctx: &mut RunContext, c: &mut Cursors<H, R, E>) -> Result<()>
    where
        H: KeyedStore<Record = CycleHeader>,
        R: KeyedStore<Record = RateRecord>,
        E: KeyedStore<Record = HistoryEvent>,
    {
        if ctx.phase == Some(Phase::One) {
            ctx.max_reclaim = Self::find_max_reclaim(&mut c.rates)?;
            match &ctx.max_reclaim {
                Some(max) => info!("Maximum reclaim row found: {}", max.key),
                None => debug!("No maximum reclaim row for {}", self.config.owner_key),
            }
        }

        if c.rates.first()?.is_end_of_stream() {
            warn!(
                "Rate master for {} is empty; no header can resolve a rate",
                self.config.owner_key
            );
            ctx.go_nogo = false;
        }
        c.history.first()?;
        Ok(())
    }

    /// One pass over the rate master looking for the `MAX` sentinel row.
    fn find_max_reclaim<R>(rates: &mut StreamCursor<R>) -> Result<Option<RateRecord>>
    where
        R: KeyedStore<Record = RateRecord>,
    {
        loop {
            match rates.next()? {
                Fetch::Record(rate) if rate.key.ext == MAX_RECLAIM_EXT => {
                    return Ok(Some(rate.clone()))
                }
                Fetch::Record(_) => {}
                Fetch::EndOfStream => return Ok(None),
            }
        }
    }

    fn looping<H, R, E>(&self, ctx: &mut RunContext, c: &mut Cursors<H, R, E>) -> Result<()>
    where
        H: KeyedStore<Record = CycleHeader>,
        R: KeyedStore<Record = RateRecord>,
        E: KeyedStore<Record = HistoryEvent>,
    {
        loop {
            if self.abort.is_requested() {
                ctx.fail(format!(
                    "abort requested after {} headers",
                    ctx.outcomes.len()
                ));
                return Ok(());
            }

            let header = match c.headers.next()? {
                Fetch::Record(header) => header.clone(),
                Fetch::EndOfStream => break,
            };
            let outcome = self.process_header(ctx, c, &header)?;
            ctx.outcomes.push(HeaderOutcome { header, outcome });
        }

        info!("Processed {} headers", ctx.outcomes.len());
        Ok(())
    }

    fn process_header<H, R, E>(
        &self,
        ctx: &mut RunContext,
        c: &mut Cursors<H, R, E>,
        header: &CycleHeader,
    ) -> Result<MatchOutcome>
    where
        H: KeyedStore<Record = CycleHeader>,
        R: KeyedStore<Record = RateRecord>,
        E: KeyedStore<Record = HistoryEvent>,
    {
        let repeated = ctx
            .saved_rate
            .as_ref()
            .filter(|(key, _)| *key == header.rate_key)
            .map(|(_, saved)| saved.clone());
        let rate_match = match repeated {
            Some(saved) => {
                debug!(
                    "Cycle {}: same rate key {} as the previous header",
                    header.cycle_key, header.rate_key
                );
                saved
            }
            None => {
                let rate_went_back = c
                    .headers
                    .previous()
                    .is_some_and(|prev| header.rate_key < prev.rate_key);
                if rate_went_back {
                    debug!(
                        "Cycle {}: rate key {} is behind the previous header, rewinding rates",
                        header.cycle_key, header.rate_key
                    );
                    c.rates.first()?;
                }

                let resolved = if ctx.go_nogo {
                    self.resolver.resolve(&mut c.rates, &header.rate_key)?
                } else {
                    RateMatch::NoMatch(NoMatchReason::NotOnFile)
                };
                ctx.saved_rate = Some((header.rate_key.clone(), resolved.clone()));
                resolved
            }
        };
        let rate = match rate_match {
            RateMatch::Resolved(rate) => rate,
            RateMatch::NoMatch(reason) => {
                debug!(
                    "Cycle {}: {} for {} in {}",
                    header.cycle_key,
                    reason.as_str(),
                    header.rate_key,
                    self.config.service_month
                );
                return Ok(MatchOutcome::Failed {
                    reason: FailureReason::NoMatch(reason),
                });
            }
        };

        if !self.config.tol_detection_applies() {
            return Ok(MatchOutcome::Resolved {
                rate,
                tol: TolStatus::NotApplicable,
            });
        }

        let scanner = EventScanner::for_header(header);
        if ctx.needs_history_rewind(&scanner) {
            debug!(
                "Cycle {}: trip {} needs history from the start",
                header.cycle_key, header.trip_number
            );
            c.history.first()?;
        }
        ctx.saved_trip = Some(scanner.trip_number());
        ctx.saved_rule = Some(scanner.rule());

        scanner.seek(&mut c.history)?;
        match scanner.scan(&mut c.history)? {
            ScanOutcome::Satisfied(event) => Ok(MatchOutcome::Resolved {
                rate,
                tol: TolStatus::Satisfied(event),
            }),
            ScanOutcome::Failed(failure) => {
                warn!(
                    "TOL failure detected for trip {} (cycle {})",
                    failure.trip_number, header.cycle_key
                );
                Ok(MatchOutcome::Failed {
                    reason: FailureReason::TolFailure(failure),
                })
            }
        }
    }

    fn close_all<H, R, E>(ctx: &mut RunContext, c: &mut Cursors<H, R, E>)
    where
        H: KeyedStore<Record = CycleHeader>,
        R: KeyedStore<Record = RateRecord>,
        E: KeyedStore<Record = HistoryEvent>,
    {
        info!("Closing streams");
        ctx.note_close(CycleHeader::STREAM, c.headers.close());
        ctx.note_close(RateRecord::STREAM, c.rates.close());
        ctx.note_close(HistoryEvent::STREAM, c.history.close());
    }

    fn finish(&self, ctx: RunContext) -> RunResult {
        let aborted = ctx.is_aborting();
        let mut follow_ups = Vec::new();
        if !aborted && ctx.phase == Some(Phase::One) {
            if self.config.tol_participant && self.config.tol_detection_applies() {
                follow_ups.push(FollowUp::SecondaryReclaim);
            }
            if ctx.max_reclaim.is_some() {
                follow_ups.push(FollowUp::FifthReclaim);
            }
        }

        RunResult {
            outcomes: ctx.outcomes,
            aborted,
            abort_reason: ctx.abort_reason,
            max_reclaim: ctx.max_reclaim,
            follow_ups,
            retrieval_mode: self.config.retrieval_mode(),
        }
    }
}

fn close_quietly<S: KeyedStore>(cursor: &mut StreamCursor<S>) {
    if let Err(e) = cursor.close() {
        warn!("Closing {} after failed open: {}", S::Record::STREAM, e);
    }
}

/// Runs one cycle with a fresh driver.
pub fn run_cycle<H, R, E>(config: JobConfig, headers: H, rates: R, history: E) -> RunResult
where
    H: KeyedStore<Record = CycleHeader>,
    R: KeyedStore<Record = RateRecord>,
    E: KeyedStore<Record = HistoryEvent>,
{
    CycleDriver::new(config).run(headers, rates, history)
}
