/*
 * Copyright (c) 2025 Clément GRENNERAT
 *
 * This program is free software: you can redistribute it and/or modify it under the terms of the
 * GNU General Public License as published by the Free Software Foundation, version 3.
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
 * even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
 * See the GNU General Public License for more details.
 * You should have received a copy of the GNU General Public License along with this program.
 * If not, see https://www.gnu.org/licenses/.
 *
 */

//! Module handling availability patterns: weekly rules, dated exceptions and
//! the day-period resolver.

use crate::model::error::CalendarError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use range_set_blaze::RangeSetBlaze;
use std::collections::HashMap;

pub const DAY_SECONDS: i64 = 24 * 3600;
pub const WEEK_SECONDS: i64 = 7 * DAY_SECONDS;

/// One row of the weekly rule table. `day_of_week` is ISO (1 = Monday,
/// 7 = Sunday); `begin` and `end` are seconds since midnight. `end < begin`
/// denotes an overnight rule whose tail continues on the following day from
/// midnight until `end`; `end == 0` encodes a shift ending exactly at
/// midnight (an empty tail).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyRule {
    pub day_of_week: u8,
    pub begin: i64,
    pub end: i64,
}

impl WeeklyRule {
    pub fn new(day_of_week: u8, begin: i64, end: i64) -> WeeklyRule {
        WeeklyRule { day_of_week, begin, end }
    }
    /// Builds a rule from "HH:MM" time-of-day strings.
    pub fn from_times(day_of_week: u8, start_time: &str, end_time: &str) -> Result<WeeklyRule, CalendarError> {
        Ok(WeeklyRule {
            day_of_week,
            begin: parsing::parse_time_of_day(start_time)?,
            end: parsing::parse_time_of_day(end_time)?,
        })
    }
}

/// One row of the dated exception table. `working = false` with no window
/// removes the whole day; with a window it removes that window from the
/// day's base periods. `working = true` adds a working window and requires
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateException {
    pub date: NaiveDate,
    pub working: bool,
    pub window: Option<(i64, i64)>,
}

impl DateException {
    /// Full-day removal.
    pub fn off(date: NaiveDate) -> DateException {
        DateException {
            date,
            working: false,
            window: None,
        }
    }
    /// Windowed removal.
    pub fn off_window(date: NaiveDate, begin: i64, end: i64) -> DateException {
        DateException {
            date,
            working: false,
            window: Some((begin, end)),
        }
    }
    /// Windowed addition.
    pub fn working_window(date: NaiveDate, begin: i64, end: i64) -> DateException {
        DateException {
            date,
            working: true,
            window: Some((begin, end)),
        }
    }
}

/// A named availability template: a weekly rule table plus a dated exception
/// table. Immutable after construction; engines and calendars share it
/// behind an `Rc`.
///
/// Internally each weekday holds the within-day portions of its own rules
/// and, separately, the overnight tails spilled over from the previous
/// day's rules, both as integer sets over seconds-of-day.
#[derive(Debug, Clone)]
pub struct Pattern {
    pattern_id: Box<str>,
    /// Within-day working seconds per weekday (index 0 = Monday).
    weekly: [RangeSetBlaze<i64>; 7],
    /// Overnight tails landing on each weekday, from the previous day's rules.
    spill: [RangeSetBlaze<i64>; 7],
    exceptions: HashMap<NaiveDate, Vec<DateException>>,
    weekly_seconds: i64,
}

impl Pattern {
    /// Builds a pattern and validates the whole rule and exception tables.
    pub fn new(
        pattern_id: &str,
        rules: Vec<WeeklyRule>,
        exceptions: Vec<DateException>,
    ) -> Result<Pattern, CalendarError> {
        let mut weekly: [RangeSetBlaze<i64>; 7] = Default::default();
        let mut spill: [RangeSetBlaze<i64>; 7] = Default::default();
        let mut weekly_seconds = 0;

        for rule in &rules {
            if !(1..=7).contains(&rule.day_of_week) {
                return Err(CalendarError::InvalidRule {
                    day_of_week: rule.day_of_week,
                    reason: "unknown weekday, expected 1 (Monday) to 7 (Sunday)".into(),
                });
            }
            if rule.begin < 0 || rule.begin >= DAY_SECONDS || rule.end < 0 || rule.end > DAY_SECONDS {
                return Err(CalendarError::InvalidRule {
                    day_of_week: rule.day_of_week,
                    reason: format!("times out of range: begin {}s, end {}s", rule.begin, rule.end).into(),
                });
            }
            if rule.begin == rule.end {
                return Err(CalendarError::InvalidRule {
                    day_of_week: rule.day_of_week,
                    reason: "empty period: begin equals end".into(),
                });
            }
            let idx = (rule.day_of_week - 1) as usize;
            if rule.end > rule.begin {
                insert_disjoint(&mut weekly[idx], rule.begin, rule.end).map_err(|_| overlap_error(rule.day_of_week))?;
                weekly_seconds += rule.end - rule.begin;
            } else {
                // Overnight: [begin, 24:00) stays on the rule's day, the tail
                // [00:00, end) spills onto the next day.
                insert_disjoint(&mut weekly[idx], rule.begin, DAY_SECONDS).map_err(|_| overlap_error(rule.day_of_week))?;
                weekly_seconds += DAY_SECONDS - rule.begin;
                if rule.end > 0 {
                    insert_disjoint(&mut spill[(idx + 1) % 7], 0, rule.end)
                        .map_err(|_| overlap_error(rule.day_of_week))?;
                    weekly_seconds += rule.end;
                }
            }
        }
        // Overnight tails must not collide with the landing day's own rules.
        for idx in 0..7 {
            if !(&weekly[idx] & &spill[idx]).is_empty() {
                return Err(CalendarError::InvalidRule {
                    day_of_week: (idx as u8) + 1,
                    reason: "overnight tail from the previous day overlaps the day's own rules".into(),
                });
            }
        }

        let mut exception_map: HashMap<NaiveDate, Vec<DateException>> = HashMap::new();
        for exception in exceptions {
            match exception.window {
                None if exception.working => {
                    return Err(CalendarError::InvalidException {
                        date: exception.date,
                        reason: "a working exception requires a time window".into(),
                    });
                }
                Some((begin, end)) if begin < 0 || end > DAY_SECONDS || begin >= end => {
                    return Err(CalendarError::InvalidException {
                        date: exception.date,
                        reason: format!("invalid window: begin {}s, end {}s", begin, end).into(),
                    });
                }
                _ => {}
            }
            exception_map.entry(exception.date).or_default().push(exception);
        }
        // Removals apply before additions; additions apply in start order.
        for entries in exception_map.values_mut() {
            entries.sort_by_key(|e| (e.working, e.window.map(|w| w.0).unwrap_or(-1)));
        }

        Ok(Pattern {
            pattern_id: pattern_id.into(),
            weekly,
            spill,
            exceptions: exception_map,
            weekly_seconds,
        })
    }

    pub fn pattern_id(&self) -> &str {
        &self.pattern_id
    }
    /// Total working seconds of the weekly rule table, exceptions excluded.
    pub fn weekly_working_seconds(&self) -> i64 {
        self.weekly_seconds
    }
    pub fn last_exception_date(&self) -> Option<NaiveDate> {
        self.exceptions.keys().max().copied()
    }
    pub fn has_working_exception_on_or_after(&self, date: NaiveDate) -> bool {
        self.exceptions
            .iter()
            .any(|(d, entries)| *d >= date && entries.iter().any(|e| e.working))
    }
    pub fn has_working_exception_on_or_before(&self, date: NaiveDate) -> bool {
        self.exceptions
            .iter()
            .any(|(d, entries)| *d <= date && entries.iter().any(|e| e.working))
    }

    /// Resolves the ordered, non-overlapping working periods of one calendar
    /// date, each bounded within `[date 00:00, date+1 00:00)`.
    ///
    /// Base periods are the weekday's own rules plus any overnight tail from
    /// the previous day's rules. Exceptions then apply: a full-day removal
    /// discards every base period, windowed removals are subtracted, and
    /// working windows are inserted, merging with adjacent periods and
    /// rejecting overlap with existing ones.
    pub fn day_periods(&self, date: NaiveDate) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>, CalendarError> {
        let idx = date.weekday().num_days_from_monday() as usize;
        let mut seconds = &self.weekly[idx] | &self.spill[idx];

        if let Some(entries) = self.exceptions.get(&date) {
            let full_day_off = entries.iter().any(|e| !e.working && e.window.is_none());
            if full_day_off {
                seconds = RangeSetBlaze::new();
            }
            for exception in entries {
                match (exception.working, exception.window) {
                    (false, Some((begin, end))) if !full_day_off => {
                        seconds = seconds - &RangeSetBlaze::from_iter([begin..=end - 1]);
                    }
                    (true, Some((begin, end))) => {
                        let window = RangeSetBlaze::from_iter([begin..=end - 1]);
                        if !(&seconds & &window).is_empty() {
                            return Err(CalendarError::InvalidException {
                                date,
                                reason: format!(
                                    "working window [{}s, {}s) overlaps an existing period",
                                    begin, end
                                )
                                .into(),
                            });
                        }
                        seconds |= &window;
                    }
                    _ => {}
                }
            }
        }

        Ok(seconds
            .ranges()
            .map(|range| {
                (
                    day_bound(date, *range.start()),
                    day_bound(date, *range.end() + 1),
                )
            })
            .collect())
    }
}

fn overlap_error(day_of_week: u8) -> CalendarError {
    CalendarError::InvalidRule {
        day_of_week,
        reason: "periods overlap within the day after overnight splitting".into(),
    }
}

/// Inserts `[begin, end)` into the set, failing if any second is already
/// present.
fn insert_disjoint(set: &mut RangeSetBlaze<i64>, begin: i64, end: i64) -> Result<(), ()> {
    let window = RangeSetBlaze::from_iter([begin..=end - 1]);
    if !(&*set & &window).is_empty() {
        return Err(());
    }
    *set |= &window;
    Ok(())
}

/// Datetime of `seconds` since midnight on `date`; `seconds == 86400` is the
/// following midnight.
fn day_bound(date: NaiveDate, seconds: i64) -> NaiveDateTime {
    if seconds >= DAY_SECONDS {
        date.succ_opt().expect("calendar date overflow").and_time(NaiveTime::MIN)
    } else {
        date.and_time(
            NaiveTime::from_num_seconds_from_midnight_opt(seconds as u32, 0).expect("seconds within a day"),
        )
    }
}

/// Module handling the parsing of patterns and test fixtures from JSON
/// documents.
pub mod parsing {
    use super::{DateException, Pattern, WeeklyRule, DAY_SECONDS};
    use crate::model::error::CalendarError;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Serialize};

    /// One row of the `rules` fixture table.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RuleRow {
        pub pattern_id: Box<str>,
        pub day_of_week: u8,
        pub start_time: Box<str>,
        pub end_time: Box<str>,
    }

    /// One row of the `exceptions` fixture table.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ExceptionRow {
        pub pattern_id: Box<str>,
        pub exception_date: Box<str>,
        pub is_working: u8,
        #[serde(default)]
        pub start_time: Option<Box<str>>,
        #[serde(default)]
        pub end_time: Option<Box<str>>,
    }

    fn default_min_split() -> i64 {
        1
    }

    /// One row of the `expected` fixture table: a query with its literal
    /// inputs and expected outputs. Datetimes are "YYYY-MM-DD HH:MM".
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "kind")]
    pub enum ExpectedRow {
        #[serde(rename = "add_units")]
        AddUnits {
            start: Box<str>,
            units: i64,
            expected: Box<str>,
        },
        #[serde(rename = "subtract_units")]
        SubtractUnits {
            end: Box<str>,
            units: i64,
            expected: Box<str>,
        },
        #[serde(rename = "working_units_between")]
        WorkingUnitsBetween {
            begin: Box<str>,
            end: Box<str>,
            expected: i64,
        },
        #[serde(rename = "find_slot")]
        FindSlot {
            operation_id: Box<str>,
            earliest_start: Box<str>,
            work_units: i64,
            #[serde(default)]
            allow_split: bool,
            #[serde(default = "default_min_split")]
            min_split: i64,
            #[serde(default)]
            deadline: Option<Box<str>>,
            expected_spans: Vec<(Box<str>, Box<str>)>,
        },
        #[serde(rename = "allocate")]
        Allocate {
            operation_id: Box<str>,
            earliest_start: Box<str>,
            work_units: i64,
            #[serde(default)]
            allow_split: bool,
            #[serde(default = "default_min_split")]
            min_split: i64,
            #[serde(default)]
            deadline: Option<Box<str>>,
            expected_spans: Vec<(Box<str>, Box<str>)>,
        },
        #[serde(rename = "infeasible")]
        Infeasible {
            operation_id: Box<str>,
            earliest_start: Box<str>,
            work_units: i64,
            #[serde(default)]
            allow_split: bool,
            #[serde(default = "default_min_split")]
            min_split: i64,
            #[serde(default)]
            deadline: Option<Box<str>>,
            reason: Box<str>,
        },
    }

    /// A canonical fixture dataset: the portability ground truth shared by
    /// every implementation of the scheduling core.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FixtureDocument {
        pub rules: Vec<RuleRow>,
        #[serde(default)]
        pub exceptions: Vec<ExceptionRow>,
        #[serde(default)]
        pub expected: Vec<ExpectedRow>,
    }

    impl FixtureDocument {
        pub fn load_from_json(json: &str) -> Result<FixtureDocument, serde_json::Error> {
            serde_json::from_str(json)
        }
        pub fn load_from_file(path: &str) -> Result<FixtureDocument, serde_json::Error> {
            let json = std::fs::read_to_string(path).expect("Failed to read fixture file");
            Self::load_from_json(&json)
        }
    }

    impl Pattern {
        /// Builds the pattern named `pattern_id` from fixture rows, ignoring
        /// rows that belong to other patterns.
        pub fn from_rows(
            pattern_id: &str,
            rules: &[RuleRow],
            exceptions: &[ExceptionRow],
        ) -> Result<Pattern, CalendarError> {
            let mut weekly = Vec::new();
            for row in rules.iter().filter(|r| &*r.pattern_id == pattern_id) {
                weekly.push(WeeklyRule::from_times(row.day_of_week, &row.start_time, &row.end_time)?);
            }
            let mut dated = Vec::new();
            for row in exceptions.iter().filter(|r| &*r.pattern_id == pattern_id) {
                let date = parse_date(&row.exception_date)?;
                let window = match (&row.start_time, &row.end_time) {
                    (Some(start), Some(end)) => Some((parse_time_of_day(start)?, parse_time_of_day(end)?)),
                    (None, None) => None,
                    _ => {
                        return Err(CalendarError::InvalidException {
                            date,
                            reason: "a window needs both start_time and end_time".into(),
                        });
                    }
                };
                dated.push(DateException {
                    date,
                    working: row.is_working != 0,
                    window,
                });
            }
            Pattern::new(pattern_id, weekly, dated)
        }
    }

    /// Parses a "HH:MM" time of day into seconds since midnight. "24:00" is
    /// accepted as the end-of-day bound.
    pub fn parse_time_of_day(time_str: &str) -> Result<i64, CalendarError> {
        let invalid = || CalendarError::InvalidArgument(format!("invalid time of day '{}', expected HH:MM", time_str).into());
        let (hours_str, minutes_str) = time_str.split_once(':').ok_or_else(invalid)?;
        let hours = hours_str.parse::<i64>().map_err(|_| invalid())?;
        let minutes = minutes_str.parse::<i64>().map_err(|_| invalid())?;
        if !(0..=24).contains(&hours) || !(0..=59).contains(&minutes) || (hours == 24 && minutes != 0) {
            return Err(invalid());
        }
        let seconds = hours * 3600 + minutes * 60;
        debug_assert!(seconds <= DAY_SECONDS);
        Ok(seconds)
    }

    /// Parses a "YYYY-MM-DD" date.
    pub fn parse_date(date_str: &str) -> Result<NaiveDate, CalendarError> {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| CalendarError::InvalidArgument(format!("invalid date '{}': {}", date_str, e).into()))
    }

    /// Parses a "YYYY-MM-DD HH:MM" datetime, with seconds optional.
    pub fn parse_datetime(datetime_str: &str) -> Result<NaiveDateTime, CalendarError> {
        // Add seconds if not present
        let with_seconds = if datetime_str.len() == 16 {
            format!("{}:00", datetime_str)
        } else {
            datetime_str.to_string()
        };
        NaiveDateTime::parse_from_str(&with_seconds, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| CalendarError::InvalidArgument(format!("invalid datetime '{}': {}", datetime_str, e).into()))
    }
}
