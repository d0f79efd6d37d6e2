use crate::calendar::pattern::parsing::{parse_datetime, ExpectedRow, FixtureDocument};
use crate::calendar::pattern::Pattern;
use crate::calendar::resolution::Resolution;
use crate::calendar::tests::pattern_mock::{dt, epoch};
use crate::calendar::walk::WorkCalendar;
use crate::engine::capacity::CapacityEngine;
use crate::model::allocation::Span;
use crate::model::error::EngineError;

/// The canonical dataset: queries and literal results any implementation of
/// the scheduling core must reproduce.
const CANONICAL_WEEK: &str = r#"{
        "rules": [
            {"pattern_id": "standard", "day_of_week": 1, "start_time": "09:00", "end_time": "17:00"},
            {"pattern_id": "standard", "day_of_week": 2, "start_time": "09:00", "end_time": "17:00"},
            {"pattern_id": "standard", "day_of_week": 3, "start_time": "09:00", "end_time": "17:00"},
            {"pattern_id": "standard", "day_of_week": 4, "start_time": "09:00", "end_time": "17:00"},
            {"pattern_id": "standard", "day_of_week": 5, "start_time": "09:00", "end_time": "17:00"},
            {"pattern_id": "nights", "day_of_week": 1, "start_time": "22:00", "end_time": "06:00"}
        ],
        "exceptions": [
            {"pattern_id": "standard", "exception_date": "2025-03-04", "is_working": 0},
            {"pattern_id": "standard", "exception_date": "2025-03-08", "is_working": 1, "start_time": "10:00", "end_time": "14:00"}
        ],
        "expected": [
            {"kind": "add_units", "start": "2025-03-03 09:00", "units": 60, "expected": "2025-03-03 10:00"},
            {"kind": "add_units", "start": "2025-03-03 16:30", "units": 60, "expected": "2025-03-05 09:30"},
            {"kind": "subtract_units", "end": "2025-03-05 09:30", "units": 60, "expected": "2025-03-03 16:30"},
            {"kind": "working_units_between", "begin": "2025-03-03 09:00", "end": "2025-03-05 12:00", "expected": 660},
            {"kind": "find_slot", "operation_id": "A", "earliest_start": "2025-03-03 09:00", "work_units": 120,
             "expected_spans": [["2025-03-03 09:00", "2025-03-03 11:00"]]},
            {"kind": "allocate", "operation_id": "A", "earliest_start": "2025-03-03 09:00", "work_units": 120,
             "expected_spans": [["2025-03-03 09:00", "2025-03-03 11:00"]]},
            {"kind": "allocate", "operation_id": "B", "earliest_start": "2025-03-03 16:30", "work_units": 60,
             "allow_split": true,
             "expected_spans": [["2025-03-03 16:30", "2025-03-03 17:00"], ["2025-03-05 09:00", "2025-03-05 09:30"]]},
            {"kind": "infeasible", "operation_id": "D", "earliest_start": "2025-03-03 09:00", "work_units": 600,
             "deadline": "2025-03-04 00:00", "reason": "deadline"}
        ]
    }"#;

fn expected_spans(resolution: &Resolution, pairs: &[(Box<str>, Box<str>)]) -> Vec<Span> {
    pairs
        .iter()
        .map(|(begin, end)| {
            Span::new(
                resolution.to_int(parse_datetime(begin).unwrap(), epoch()).unwrap(),
                resolution.to_int(parse_datetime(end).unwrap(), epoch()).unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_canonical_week_fixture() {
    let document = FixtureDocument::load_from_json(CANONICAL_WEEK).unwrap();
    let pattern = Pattern::from_rows("standard", &document.rules, &document.exceptions).unwrap();
    let resolution = Resolution::minute();
    let calendar = WorkCalendar::new(pattern, resolution.clone());
    let mut engine =
        CapacityEngine::from_calendar("m1", calendar.clone(), epoch(), dt(2025, 3, 10, 0, 0), epoch()).unwrap();

    for row in &document.expected {
        match row {
            ExpectedRow::AddUnits { start, units, expected } => {
                assert_eq!(
                    calendar.add_units(parse_datetime(start).unwrap(), *units).unwrap(),
                    parse_datetime(expected).unwrap(),
                    "add_units({}, {})",
                    start,
                    units
                );
            }
            ExpectedRow::SubtractUnits { end, units, expected } => {
                assert_eq!(
                    calendar.subtract_units(parse_datetime(end).unwrap(), *units).unwrap(),
                    parse_datetime(expected).unwrap(),
                    "subtract_units({}, {})",
                    end,
                    units
                );
            }
            ExpectedRow::WorkingUnitsBetween { begin, end, expected } => {
                assert_eq!(
                    calendar
                        .working_units_between(parse_datetime(begin).unwrap(), parse_datetime(end).unwrap())
                        .unwrap(),
                    *expected,
                    "working_units_between({}, {})",
                    begin,
                    end
                );
            }
            ExpectedRow::FindSlot {
                operation_id,
                earliest_start,
                work_units,
                allow_split,
                min_split,
                deadline,
                expected_spans: pairs,
            } => {
                let record = engine
                    .find_slot(
                        operation_id,
                        resolution.to_int(parse_datetime(earliest_start).unwrap(), epoch()).unwrap(),
                        *work_units,
                        *allow_split,
                        *min_split,
                        deadline
                            .as_ref()
                            .map(|d| resolution.to_int(parse_datetime(d).unwrap(), epoch()).unwrap()),
                    )
                    .unwrap();
                assert_eq!(record.spans(), expected_spans(&resolution, pairs), "find_slot {}", operation_id);
            }
            ExpectedRow::Allocate {
                operation_id,
                earliest_start,
                work_units,
                allow_split,
                min_split,
                deadline,
                expected_spans: pairs,
            } => {
                let record = engine
                    .allocate(
                        operation_id,
                        resolution.to_int(parse_datetime(earliest_start).unwrap(), epoch()).unwrap(),
                        *work_units,
                        *allow_split,
                        *min_split,
                        deadline
                            .as_ref()
                            .map(|d| resolution.to_int(parse_datetime(d).unwrap(), epoch()).unwrap()),
                    )
                    .unwrap();
                assert_eq!(record.spans(), expected_spans(&resolution, pairs), "allocate {}", operation_id);
            }
            ExpectedRow::Infeasible {
                operation_id,
                earliest_start,
                work_units,
                allow_split,
                min_split,
                deadline,
                reason,
            } => {
                let err = engine
                    .find_slot(
                        operation_id,
                        resolution.to_int(parse_datetime(earliest_start).unwrap(), epoch()).unwrap(),
                        *work_units,
                        *allow_split,
                        *min_split,
                        deadline
                            .as_ref()
                            .map(|d| resolution.to_int(parse_datetime(d).unwrap(), epoch()).unwrap()),
                    )
                    .unwrap_err();
                match err {
                    EngineError::Infeasible { reason: actual, .. } => {
                        assert_eq!(&*actual.to_string(), &**reason, "infeasible {}", operation_id);
                    }
                    other => panic!("expected an infeasibility error for {}, got {:?}", operation_id, other),
                }
            }
        }
    }

    // After the allocate rows, A and B are live.
    assert_eq!(engine.live_allocations().count(), 2);
}
