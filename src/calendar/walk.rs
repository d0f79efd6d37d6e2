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

//! Horizon-free time arithmetic over a pattern: the lazy day-by-day walks.

use crate::calendar::pattern::Pattern;
use crate::calendar::resolution::Resolution;
use crate::model::error::CalendarError;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::VecDeque;
use std::rc::Rc;

/// A working calendar: an immutable [`Pattern`] paired with the resolution
/// its unit counts are expressed in. Cloning is cheap; the pattern is shared.
///
/// All walks scan day by day through the day-period resolver and never
/// materialise a horizon.
#[derive(Debug, Clone)]
pub struct WorkCalendar {
    pattern: Rc<Pattern>,
    resolution: Resolution,
}

impl WorkCalendar {
    pub fn new(pattern: Pattern, resolution: Resolution) -> WorkCalendar {
        WorkCalendar {
            pattern: Rc::new(pattern),
            resolution,
        }
    }

    pub fn pattern(&self) -> &Rc<Pattern> {
        &self.pattern
    }
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Walks forward from `start` until `units` working units have elapsed
    /// and returns the resulting datetime. A start inside non-working time
    /// first advances to the next working edge; a start inside a period
    /// consumes from that point on.
    pub fn add_units(&self, start: NaiveDateTime, units: i64) -> Result<NaiveDateTime, CalendarError> {
        if units < 0 {
            return Err(CalendarError::InvalidArgument(
                format!("cannot add a negative unit count: {}", units).into(),
            ));
        }
        if units == 0 {
            return Ok(start);
        }
        let unit_seconds = self.resolution.unit_seconds();
        let mut remaining = units;
        let mut date = start.date();
        loop {
            for (period_begin, period_end) in self.pattern.day_periods(date)? {
                let effective_start = period_begin.max(start);
                if effective_start >= period_end {
                    continue;
                }
                let available = period_end.signed_duration_since(effective_start).num_seconds() / unit_seconds;
                if remaining <= available {
                    return Ok(effective_start + Duration::seconds(remaining * unit_seconds));
                }
                remaining -= available;
            }
            if !self.has_working_time_after(date) {
                return Err(CalendarError::Infeasible {
                    units_requested: units,
                    units_remaining: remaining,
                });
            }
            date = date.succ_opt().expect("calendar date overflow");
        }
    }

    /// Walks backward from `end` until `units` working units have been
    /// unwound; the exact inverse of [`WorkCalendar::add_units`] on aligned
    /// input.
    pub fn subtract_units(&self, end: NaiveDateTime, units: i64) -> Result<NaiveDateTime, CalendarError> {
        if units < 0 {
            return Err(CalendarError::InvalidArgument(
                format!("cannot subtract a negative unit count: {}", units).into(),
            ));
        }
        if units == 0 {
            return Ok(end);
        }
        let unit_seconds = self.resolution.unit_seconds();
        let mut remaining = units;
        let mut date = end.date();
        loop {
            for (period_begin, period_end) in self.pattern.day_periods(date)?.into_iter().rev() {
                let effective_end = period_end.min(end);
                if effective_end <= period_begin {
                    continue;
                }
                let available = effective_end.signed_duration_since(period_begin).num_seconds() / unit_seconds;
                if remaining <= available {
                    return Ok(effective_end - Duration::seconds(remaining * unit_seconds));
                }
                remaining -= available;
            }
            if !self.has_working_time_before(date) {
                return Err(CalendarError::Infeasible {
                    units_requested: units,
                    units_remaining: remaining,
                });
            }
            date = date.pred_opt().expect("calendar date underflow");
        }
    }

    /// Counts the whole working units inside `[begin, end)`, summing each
    /// day's periods clipped to the range.
    pub fn working_units_between(&self, begin: NaiveDateTime, end: NaiveDateTime) -> Result<i64, CalendarError> {
        let unit_seconds = self.resolution.unit_seconds();
        let mut units = 0;
        for interval in self.working_intervals_in_range(begin, end)? {
            let (clip_begin, clip_end) = interval?;
            units += clip_end.signed_duration_since(clip_begin).num_seconds() / unit_seconds;
        }
        Ok(units)
    }

    /// Enumerates each period's clipped overlap with `[begin, end)` in
    /// order. The iterator is finite and resolves one day at a time.
    pub fn working_intervals_in_range(
        &self,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<WorkingIntervals<'_>, CalendarError> {
        if begin > end {
            return Err(CalendarError::InvalidArgument(
                format!("inverted range: {} > {}", begin, end).into(),
            ));
        }
        Ok(WorkingIntervals {
            calendar: self,
            begin,
            end,
            date: begin.date(),
            pending: VecDeque::new(),
            done: false,
        })
    }

    fn has_working_time_after(&self, date: NaiveDate) -> bool {
        self.pattern.weekly_working_seconds() > 0 || self.pattern.has_working_exception_on_or_after(date)
    }
    fn has_working_time_before(&self, date: NaiveDate) -> bool {
        self.pattern.weekly_working_seconds() > 0 || self.pattern.has_working_exception_on_or_before(date)
    }
}

/// Iterator over the working intervals of a datetime range, clipped to the
/// range bounds. Yields resolver failures as errors and stops afterwards.
pub struct WorkingIntervals<'c> {
    calendar: &'c WorkCalendar,
    begin: NaiveDateTime,
    end: NaiveDateTime,
    date: NaiveDate,
    pending: VecDeque<(NaiveDateTime, NaiveDateTime)>,
    done: bool,
}

impl<'c> Iterator for WorkingIntervals<'c> {
    type Item = Result<(NaiveDateTime, NaiveDateTime), CalendarError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(interval) = self.pending.pop_front() {
                return Some(Ok(interval));
            }
            if self.date > self.end.date() {
                self.done = true;
                return None;
            }
            let periods = match self.calendar.pattern.day_periods(self.date) {
                Ok(periods) => periods,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            for (period_begin, period_end) in periods {
                let clip_begin = period_begin.max(self.begin);
                let clip_end = period_end.min(self.end);
                if clip_begin < clip_end {
                    self.pending.push_back((clip_begin, clip_end));
                }
            }
            self.date = self.date.succ_opt().expect("calendar date overflow");
        }
    }
}
