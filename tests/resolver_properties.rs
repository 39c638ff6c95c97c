//! Property tests for the merge-join resolver and the trip scanner.

use proptest::prelude::*;
use reclaim_cycle::{
    EventScanner, HistoryEvent, MemoryStore, RateKey, RateMatch, RateRecord, RateResolver,
    ReclaimRate, ScanOutcome, ServiceMonth, StreamCursor, TolRule,
};
use std::str::FromStr;

/// Month number `index` counted from January 2000.
fn month_at(index: u32) -> ServiceMonth {
    ServiceMonth::from_yyyymm((2000 + index / 12) * 100 + index % 12 + 1).unwrap()
}

fn rate(code: &str, effective: u32, expire: u32, description: &str) -> RateRecord {
    RateRecord {
        owner_key: "UP".to_string(),
        key: RateKey::new(code, ""),
        effective_month: month_at(effective),
        expire_month: month_at(expire),
        rate: ReclaimRate::from_str("1.00").unwrap(),
        description: description.to_string(),
    }
}

fn resolve_in(rates: Vec<RateRecord>, month: ServiceMonth, code: &str) -> (RateMatch, usize) {
    let mut cursor = StreamCursor::open(MemoryStore::from_records(rates), "UP").unwrap();
    let result = RateResolver::new(month)
        .resolve(&mut cursor, &RateKey::new(code, ""))
        .unwrap();
    (result, cursor.reads())
}

fn event(trip: u32, seq: usize, receivable: bool) -> HistoryEvent {
    HistoryEvent {
        owner_key: "UP".to_string(),
        trip_number: trip,
        tol_rule5_receivable: receivable,
        delivery: false,
        event_type: "MOVE".to_string(),
        timestamp: format!("{:04}", seq),
    }
}

proptest! {
    /// Generations whose windows miss the service month never change the answer.
    #[test]
    fn resolution_ignores_out_of_window_generations(
        probe in 200u32..400,
        back in 0u32..50,
        forward in 0u32..50,
        older in prop::collection::vec((1u32..40, 0u32..30), 0..4),
        newer in prop::collection::vec((1u32..40, 0u32..30), 0..4),
    ) {
        let effective = probe - back;
        let valid = rate("B", effective, probe + forward, "valid");

        let mut rates = vec![
            rate("A", 0, 600, "below"),
            valid.clone(),
            rate("C", 0, 600, "above"),
        ];
        for (gap, len) in &older {
            let expire = effective - gap;
            rates.push(rate("B", expire - len, expire, "older"));
        }
        for (gap, len) in &newer {
            let start = probe + gap;
            rates.push(rate("B", start, start + len, "newer"));
        }

        let (result, _) = resolve_in(rates, month_at(probe), "B");
        prop_assert_eq!(result, RateMatch::Resolved(valid));
    }

    /// Without a covering generation the key never resolves.
    #[test]
    fn no_covering_generation_never_resolves(
        probe in 200u32..400,
        older in prop::collection::vec((1u32..40, 0u32..30), 0..4),
        newer in prop::collection::vec((1u32..40, 0u32..30), 0..4),
    ) {
        let mut rates = Vec::new();
        for (gap, len) in &older {
            let expire = probe - gap;
            rates.push(rate("B", expire - len, expire, "older"));
        }
        for (gap, len) in &newer {
            let start = probe + gap;
            rates.push(rate("B", start, start + len, "newer"));
        }

        let (result, _) = resolve_in(rates, month_at(probe), "B");
        prop_assert!(matches!(result, RateMatch::NoMatch(_)));
    }

    /// Ascending targets read every rate row at most once in total.
    #[test]
    fn ascending_targets_read_in_one_pass(
        codes in prop::collection::vec(0u8..20, 0..30),
        targets in prop::collection::vec(0u8..25, 0..15),
    ) {
        let rates: Vec<RateRecord> = codes
            .iter()
            .map(|c| rate(&format!("K{:02}", c), 0, 600, ""))
            .collect();
        let total = rates.len();
        let mut targets = targets;
        targets.sort_unstable();

        let mut cursor = StreamCursor::open(MemoryStore::from_records(rates), "UP").unwrap();
        let resolver = RateResolver::new(month_at(300));
        for target in &targets {
            let key = RateKey::new(&format!("K{:02}", target), "");
            let result = resolver.resolve(&mut cursor, &key).unwrap();
            prop_assert_eq!(result.is_resolved(), codes.contains(target));
        }
        prop_assert!(cursor.reads() <= total + 1);
    }

    /// A scan succeeds exactly when its trip holds a qualifying event, and
    /// never reads past the first event of the next trip.
    #[test]
    fn scan_is_bounded_by_its_group(
        before in prop::collection::vec(any::<bool>(), 0..5),
        group in prop::collection::vec(any::<bool>(), 0..8),
        after in prop::collection::vec(any::<bool>(), 0..5),
    ) {
        let mut events = Vec::new();
        for (i, r) in before.iter().enumerate() {
            events.push(event(100, i, *r));
        }
        for (i, r) in group.iter().enumerate() {
            events.push(event(200, i, *r));
        }
        for (i, r) in after.iter().enumerate() {
            events.push(event(300, i, *r));
        }

        let mut cursor = StreamCursor::open(MemoryStore::from_records(events), "UP").unwrap();
        let scanner = EventScanner::new(200, TolRule::Receivable);
        scanner.seek(&mut cursor).unwrap();
        let reads_at_group = cursor.reads();
        let outcome = scanner.scan(&mut cursor).unwrap();

        match outcome {
            ScanOutcome::Satisfied(found) => {
                let first = group.iter().position(|r| *r).unwrap();
                prop_assert_eq!(found.timestamp, format!("{:04}", first));
            }
            ScanOutcome::Failed(failure) => {
                prop_assert!(!group.iter().any(|r| *r));
                prop_assert_eq!(failure.events_examined, group.len());
            }
        }
        prop_assert!(cursor.reads() - reads_at_group <= group.len());
    }
}
