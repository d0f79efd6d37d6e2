use crate::calendar::pattern::parsing::{parse_time_of_day, FixtureDocument};
use crate::calendar::pattern::{DateException, Pattern, WeeklyRule};
use crate::calendar::tests::pattern_mock::{date, dt, hm, night_shift_pattern, standard_week_pattern};
use crate::model::error::CalendarError;

#[test]
fn test_standard_week_periods() {
    let pattern = standard_week_pattern();
    // Monday: one plain period.
    assert_eq!(
        pattern.day_periods(date(2025, 3, 3)).unwrap(),
        vec![(dt(2025, 3, 3, 9, 0), dt(2025, 3, 3, 17, 0))]
    );
    // Tuesday is a full-day holiday.
    assert_eq!(pattern.day_periods(date(2025, 3, 4)).unwrap(), vec![]);
    // Saturday only works through its overtime exception.
    assert_eq!(
        pattern.day_periods(date(2025, 3, 8)).unwrap(),
        vec![(dt(2025, 3, 8, 10, 0), dt(2025, 3, 8, 14, 0))]
    );
    // Sunday has no rule at all.
    assert_eq!(pattern.day_periods(date(2025, 3, 9)).unwrap(), vec![]);
}

#[test]
fn test_overnight_rule_splits_across_days() {
    let pattern = night_shift_pattern();
    // Monday contributes only the evening part.
    assert_eq!(
        pattern.day_periods(date(2025, 3, 3)).unwrap(),
        vec![(dt(2025, 3, 3, 22, 0), dt(2025, 3, 4, 0, 0))]
    );
    // Tuesday gets Monday's tail plus its own evening.
    assert_eq!(
        pattern.day_periods(date(2025, 3, 4)).unwrap(),
        vec![
            (dt(2025, 3, 4, 0, 0), dt(2025, 3, 4, 6, 0)),
            (dt(2025, 3, 4, 22, 0), dt(2025, 3, 5, 0, 0)),
        ]
    );
    // Saturday only gets Friday's tail.
    assert_eq!(
        pattern.day_periods(date(2025, 3, 8)).unwrap(),
        vec![(dt(2025, 3, 8, 0, 0), dt(2025, 3, 8, 6, 0))]
    );
    assert_eq!(pattern.day_periods(date(2025, 3, 9)).unwrap(), vec![]);
}

#[test]
fn test_overnight_rule_ending_at_midnight_has_empty_tail() {
    let pattern = Pattern::new("late", vec![WeeklyRule::new(1, hm(22, 0), 0)], vec![]).unwrap();
    assert_eq!(
        pattern.day_periods(date(2025, 3, 3)).unwrap(),
        vec![(dt(2025, 3, 3, 22, 0), dt(2025, 3, 4, 0, 0))]
    );
    assert_eq!(pattern.day_periods(date(2025, 3, 4)).unwrap(), vec![]);
}

#[test]
fn test_weekly_working_seconds() {
    assert_eq!(standard_week_pattern().weekly_working_seconds(), 5 * 8 * 3600);
    assert_eq!(night_shift_pattern().weekly_working_seconds(), 5 * 8 * 3600);
}

#[test]
fn test_unknown_weekday_rejected() {
    let err = Pattern::new("bad", vec![WeeklyRule::new(8, hm(9, 0), hm(17, 0))], vec![]).unwrap_err();
    assert!(matches!(err, CalendarError::InvalidRule { day_of_week: 8, .. }));
    assert!(Pattern::new("bad", vec![WeeklyRule::new(0, hm(9, 0), hm(17, 0))], vec![]).is_err());
}

#[test]
fn test_empty_period_rejected() {
    assert!(matches!(
        Pattern::new("bad", vec![WeeklyRule::new(1, hm(9, 0), hm(9, 0))], vec![]),
        Err(CalendarError::InvalidRule { .. })
    ));
}

#[test]
fn test_overlapping_rules_rejected() {
    let rules = vec![
        WeeklyRule::new(1, hm(9, 0), hm(17, 0)),
        WeeklyRule::new(1, hm(16, 0), hm(18, 0)),
    ];
    assert!(matches!(
        Pattern::new("bad", rules, vec![]),
        Err(CalendarError::InvalidRule { day_of_week: 1, .. })
    ));
    // Adjacent rules are fine.
    let rules = vec![
        WeeklyRule::new(1, hm(9, 0), hm(12, 0)),
        WeeklyRule::new(1, hm(12, 0), hm(17, 0)),
    ];
    assert!(Pattern::new("split-day", rules, vec![]).is_ok());
}

#[test]
fn test_overnight_tail_overlapping_next_day_rejected() {
    let rules = vec![
        WeeklyRule::new(1, hm(20, 0), hm(4, 0)),
        WeeklyRule::new(2, hm(3, 0), hm(10, 0)),
    ];
    assert!(matches!(
        Pattern::new("bad", rules, vec![]),
        Err(CalendarError::InvalidRule { day_of_week: 2, .. })
    ));
}

#[test]
fn test_working_exception_requires_window() {
    let exception = DateException {
        date: date(2025, 3, 8),
        working: true,
        window: None,
    };
    assert!(matches!(
        Pattern::new("bad", vec![], vec![exception]),
        Err(CalendarError::InvalidException { .. })
    ));
}

#[test]
fn test_inverted_exception_window_rejected() {
    let exception = DateException::off_window(date(2025, 3, 5), hm(13, 0), hm(12, 0));
    assert!(matches!(
        Pattern::new("bad", vec![], vec![exception]),
        Err(CalendarError::InvalidException { .. })
    ));
}

#[test]
fn test_removal_window_splits_period() {
    let rules = vec![WeeklyRule::new(3, hm(9, 0), hm(17, 0))];
    let exceptions = vec![DateException::off_window(date(2025, 3, 5), hm(12, 0), hm(13, 0))];
    let pattern = Pattern::new("lunch", rules, exceptions).unwrap();
    assert_eq!(
        pattern.day_periods(date(2025, 3, 5)).unwrap(),
        vec![
            (dt(2025, 3, 5, 9, 0), dt(2025, 3, 5, 12, 0)),
            (dt(2025, 3, 5, 13, 0), dt(2025, 3, 5, 17, 0)),
        ]
    );
}

#[test]
fn test_working_window_merges_with_adjacent_period() {
    let rules = vec![WeeklyRule::new(1, hm(9, 0), hm(17, 0))];
    let exceptions = vec![DateException::working_window(date(2025, 3, 3), hm(17, 0), hm(19, 0))];
    let pattern = Pattern::new("overtime", rules, exceptions).unwrap();
    assert_eq!(
        pattern.day_periods(date(2025, 3, 3)).unwrap(),
        vec![(dt(2025, 3, 3, 9, 0), dt(2025, 3, 3, 19, 0))]
    );
}

#[test]
fn test_working_window_overlapping_period_rejected() {
    let rules = vec![WeeklyRule::new(1, hm(9, 0), hm(17, 0))];
    let exceptions = vec![DateException::working_window(date(2025, 3, 3), hm(16, 0), hm(19, 0))];
    let pattern = Pattern::new("bad", rules, exceptions).unwrap();
    assert!(matches!(
        pattern.day_periods(date(2025, 3, 3)),
        Err(CalendarError::InvalidException { .. })
    ));
}

#[test]
fn test_full_day_off_with_replacement_window() {
    let rules = vec![WeeklyRule::new(2, hm(9, 0), hm(17, 0))];
    let exceptions = vec![
        DateException::off(date(2025, 3, 4)),
        DateException::working_window(date(2025, 3, 4), hm(10, 0), hm(12, 0)),
    ];
    let pattern = Pattern::new("reduced", rules, exceptions).unwrap();
    assert_eq!(
        pattern.day_periods(date(2025, 3, 4)).unwrap(),
        vec![(dt(2025, 3, 4, 10, 0), dt(2025, 3, 4, 12, 0))]
    );
}

#[test]
fn test_parse_time_of_day() {
    assert_eq!(parse_time_of_day("00:00").unwrap(), 0);
    assert_eq!(parse_time_of_day("09:30").unwrap(), hm(9, 30));
    assert_eq!(parse_time_of_day("24:00").unwrap(), 24 * 3600);
    assert!(parse_time_of_day("24:01").is_err());
    assert!(parse_time_of_day("09:61").is_err());
    assert!(parse_time_of_day("0900").is_err());
    assert!(parse_time_of_day("").is_err());
}

#[test]
fn test_pattern_from_fixture_rows() {
    let json = r#"{
            "rules": [
                {"pattern_id": "standard", "day_of_week": 1, "start_time": "09:00", "end_time": "17:00"},
                {"pattern_id": "standard", "day_of_week": 2, "start_time": "09:00", "end_time": "17:00"},
                {"pattern_id": "nights", "day_of_week": 1, "start_time": "22:00", "end_time": "06:00"}
            ],
            "exceptions": [
                {"pattern_id": "standard", "exception_date": "2025-03-04", "is_working": 0},
                {"pattern_id": "nights", "exception_date": "2025-03-03", "is_working": 0}
            ]
        }"#;
    let document = FixtureDocument::load_from_json(json).unwrap();

    // Rows of other patterns are ignored.
    let standard = Pattern::from_rows("standard", &document.rules, &document.exceptions).unwrap();
    assert_eq!(standard.weekly_working_seconds(), 2 * 8 * 3600);
    assert_eq!(standard.day_periods(date(2025, 3, 4)).unwrap(), vec![]);
    assert_eq!(
        standard.day_periods(date(2025, 3, 3)).unwrap(),
        vec![(dt(2025, 3, 3, 9, 0), dt(2025, 3, 3, 17, 0))]
    );

    let nights = Pattern::from_rows("nights", &document.rules, &document.exceptions).unwrap();
    assert_eq!(nights.day_periods(date(2025, 3, 3)).unwrap(), vec![]);
    assert_eq!(
        nights.day_periods(date(2025, 3, 4)).unwrap(),
        vec![(dt(2025, 3, 4, 0, 0), dt(2025, 3, 4, 6, 0))]
    );
}
