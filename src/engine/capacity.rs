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

//! Per-resource capacity state over an integer unit horizon: materialisation
//! from a working calendar, the read-only slot finder, commit/release,
//! dynamic capacity mutation and snapshot/restore.

use crate::calendar::pattern::WEEK_SECONDS;
use crate::calendar::walk::WorkCalendar;
use crate::model::allocation::{AllocationRecord, Span};
use crate::model::error::{EngineError, InfeasibleReason};
use indexmap::IndexMap;
use log::{info, warn};
use chrono::NaiveDateTime;
use std::fmt::{Debug, Formatter};

/// Occupancy state of one resource over `[horizon_begin, horizon_end)` in
/// absolute units: `true` is free, `false` is occupied or non-working.
/// The source calendar and epoch are retained so the horizon can extend
/// itself on demand. Cloning yields an independent engine sharing only the
/// immutable pattern, which is how speculative branches fork state.
#[derive(Clone)]
pub struct CapacityEngine {
    resource_id: Box<str>,
    horizon_begin: i64,
    bits: Vec<bool>,
    /// Live allocations by operation id; consulted by capacity removal for
    /// conflict detection and by release to locate the record.
    allocations: IndexMap<Box<str>, AllocationRecord>,
    calendar: WorkCalendar,
    epoch: NaiveDateTime,
}

impl Debug for CapacityEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CapacityEngine {{ resource: {}, horizon: [{}, {}), free: {}, allocations: {} }}",
            self.resource_id,
            self.horizon_begin,
            self.horizon_end(),
            self.free_count(),
            self.allocations.len()
        )
    }
}

/// Opaque immutable capture of an engine's bits and allocation index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    bits: Box<[bool]>,
    allocations: IndexMap<Box<str>, AllocationRecord>,
}

/// A maximal run of equal-state units, yielded by [`CapacityEngine::runs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub begin: i64,
    pub end: i64,
    pub free: bool,
}

impl CapacityEngine {
    /// Materialises an engine from a calendar over `[horizon_start,
    /// horizon_end)`. Both bounds and every period boundary inside them must
    /// align to the calendar's resolution.
    pub fn from_calendar(
        resource_id: &str,
        calendar: WorkCalendar,
        horizon_start: NaiveDateTime,
        horizon_end: NaiveDateTime,
        epoch: NaiveDateTime,
    ) -> Result<CapacityEngine, EngineError> {
        if horizon_start > horizon_end {
            return Err(EngineError::InvalidRequest(
                format!("horizon start {} is after horizon end {}", horizon_start, horizon_end).into(),
            ));
        }
        let resolution = calendar.resolution();
        let horizon_begin = resolution.to_int(horizon_start, epoch)?;
        let horizon_end_int = resolution.to_int(horizon_end, epoch)?;
        let bits = render_calendar_bits(&calendar, epoch, horizon_begin, horizon_end_int)?;
        Ok(CapacityEngine {
            resource_id: resource_id.into(),
            horizon_begin,
            bits,
            allocations: IndexMap::new(),
            calendar,
            epoch,
        })
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }
    /// First absolute unit of the horizon (inclusive).
    pub fn horizon_begin(&self) -> i64 {
        self.horizon_begin
    }
    /// One past the last absolute unit of the horizon.
    pub fn horizon_end(&self) -> i64 {
        self.horizon_begin + self.bits.len() as i64
    }
    pub fn free_count(&self) -> usize {
        self.bits.iter().filter(|free| **free).count()
    }
    /// Read-only view of the occupancy bits; index `i` is absolute unit
    /// `horizon_begin + i`.
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
    /// State of one absolute unit, or `None` outside the horizon.
    pub fn is_free(&self, unit: i64) -> Option<bool> {
        if unit < self.horizon_begin || unit >= self.horizon_end() {
            return None;
        }
        Some(self.bits[(unit - self.horizon_begin) as usize])
    }
    pub fn live_allocations(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.allocations.values()
    }

    /// Iterates the maximal free/occupied runs of the horizon in order.
    pub fn runs(&self) -> RunIterator<'_> {
        RunIterator {
            bits: &self.bits,
            horizon_begin: self.horizon_begin,
            position: 0,
        }
    }

    /// Finds capacity for `work_units` of work starting no earlier than
    /// `earliest_start`, without mutating the engine. A non-splittable
    /// request waits for a single contiguous run long enough; a splittable
    /// request accumulates runs of at least `min_split` units. With a
    /// `deadline` the search is bounded by it and fails with reason
    /// "deadline"; without one the horizon extends speculatively (into a
    /// call-local buffer) up to a lookahead proportional to the requested
    /// work, and exhausting it fails with reason "horizon".
    pub fn find_slot(
        &self,
        operation_id: &str,
        earliest_start: i64,
        work_units: i64,
        allow_split: bool,
        min_split: i64,
        deadline: Option<i64>,
    ) -> Result<AllocationRecord, EngineError> {
        if work_units < 1 {
            return Err(EngineError::InvalidRequest(
                format!("operation {} requests {} work units, expected at least 1", operation_id, work_units).into(),
            ));
        }
        if min_split < 1 {
            return Err(EngineError::InvalidRequest(
                format!("operation {} requests a minimum split of {}, expected at least 1", operation_id, min_split).into(),
            ));
        }
        if let Some(deadline) = deadline {
            if deadline <= earliest_start {
                return Err(EngineError::InvalidRequest(
                    format!("operation {} has deadline {} at or before its earliest start {}", operation_id, deadline, earliest_start).into(),
                ));
            }
        }

        let start_abs = earliest_start.max(self.horizon_begin);
        let (cap_abs, deadline_bounded) = match deadline {
            Some(deadline) => (deadline, true),
            None => (self.lookahead_cap(start_abs, work_units), false),
        };
        let cap = cap_abs - self.horizon_begin;
        let mut probe = HorizonProbe::new(self, cap);

        let mut position = start_abs - self.horizon_begin;
        let mut remaining = work_units;
        let mut spans: Vec<Span> = Vec::new();
        while remaining > 0 && position < cap {
            // Advance to the next free unit.
            while position < cap && !probe.bit(position)? {
                position += 1;
            }
            if position >= cap {
                break;
            }
            // Measure the maximal contiguous free run.
            let mut run_end = position + 1;
            while run_end < cap && probe.bit(run_end)? {
                run_end += 1;
            }
            let run_len = run_end - position;
            if (!allow_split && run_len < remaining) || (allow_split && run_len < min_split) {
                // Too short to consume from; look for a later, larger run.
                position = run_end;
                continue;
            }
            let take = run_len.min(remaining);
            spans.push(Span::new(self.horizon_begin + position, self.horizon_begin + position + take));
            remaining -= take;
            position += take;
        }

        if remaining > 0 {
            return Err(EngineError::Infeasible {
                operation_id: operation_id.into(),
                work_units_requested: work_units,
                work_units_remaining: remaining,
                reason: if deadline_bounded {
                    InfeasibleReason::Deadline
                } else {
                    InfeasibleReason::Horizon
                },
            });
        }
        Ok(AllocationRecord::new(operation_id, &self.resource_id, work_units, allow_split, spans))
    }

    /// Marks a record's spans occupied and inserts it into the allocation
    /// index. Fails without touching any state if the record belongs to
    /// another resource, is already committed, or any span unit is no
    /// longer free. Returns the record unchanged for the caller to keep.
    pub fn commit(&mut self, record: AllocationRecord) -> Result<AllocationRecord, EngineError> {
        self.check_resource(&record)?;
        if self.allocations.contains_key(record.operation_id()) {
            return Err(EngineError::InvalidOperation {
                operation_id: record.operation_id().into(),
                reason: "record is already committed".into(),
            });
        }
        if record.begin() < self.horizon_begin {
            return Err(EngineError::InvalidOperation {
                operation_id: record.operation_id().into(),
                reason: format!("record begins at unit {} before the horizon at {}", record.begin(), self.horizon_begin).into(),
            });
        }
        // Stage the horizon extension so a failed validation changes nothing.
        let tail = if record.end() > self.horizon_end() {
            render_calendar_bits(&self.calendar, self.epoch, self.horizon_end(), record.end())?
        } else {
            Vec::new()
        };
        let horizon_len = self.bits.len() as i64;
        for span in record.spans() {
            for unit in span.begin..span.end {
                let index = unit - self.horizon_begin;
                let free = if index < horizon_len {
                    self.bits[index as usize]
                } else {
                    tail[(index - horizon_len) as usize]
                };
                if !free {
                    return Err(EngineError::InvalidOperation {
                        operation_id: record.operation_id().into(),
                        reason: format!("unit {} of span {} is not free", unit, span).into(),
                    });
                }
            }
        }
        self.apply_extension(tail);
        for span in record.spans() {
            self.fill(span.begin, span.end, false);
        }
        self.allocations.insert(record.operation_id().into(), record.clone());
        Ok(record)
    }

    /// Finds a slot and commits it in one step.
    pub fn allocate(
        &mut self,
        operation_id: &str,
        earliest_start: i64,
        work_units: i64,
        allow_split: bool,
        min_split: i64,
        deadline: Option<i64>,
    ) -> Result<AllocationRecord, EngineError> {
        let record = self.find_slot(operation_id, earliest_start, work_units, allow_split, min_split, deadline)?;
        self.commit(record)
    }

    /// Exact inverse of [`CapacityEngine::commit`]: frees the record's span
    /// units and removes it from the allocation index. A record that is not
    /// in the index (never committed, already released, or not this exact
    /// record) is rejected.
    pub fn release(&mut self, record: &AllocationRecord) -> Result<(), EngineError> {
        self.check_resource(record)?;
        match self.allocations.get(record.operation_id()) {
            Some(live) if live == record => {}
            Some(_) => {
                return Err(EngineError::InvalidOperation {
                    operation_id: record.operation_id().into(),
                    reason: "record does not match the committed record of this operation".into(),
                });
            }
            None => {
                return Err(EngineError::InvalidOperation {
                    operation_id: record.operation_id().into(),
                    reason: "record is not committed".into(),
                });
            }
        }
        for span in record.spans() {
            self.fill(span.begin, span.end, true);
        }
        self.allocations.shift_remove(record.operation_id());
        Ok(())
    }

    /// Removes capacity over `[begin, end)`: every free unit becomes
    /// occupied. Live allocations intersecting the range are reported back
    /// untouched; resolving those conflicts is the caller's decision.
    pub fn set_unavailable(&mut self, begin: i64, end: i64) -> Result<Vec<AllocationRecord>, EngineError> {
        self.check_range(begin, end)?;
        self.extend_to(end)?;
        let clamped_begin = begin.max(self.horizon_begin);
        self.fill(clamped_begin, end, false);
        let affected: Vec<AllocationRecord> = self
            .allocations
            .values()
            .filter(|record| record.intersects(begin, end))
            .cloned()
            .collect();
        if !affected.is_empty() {
            warn!(
                "capacity removal [{}, {}) on resource {} intersects {} live allocation(s)",
                begin,
                end,
                self.resource_id,
                affected.len()
            );
        }
        Ok(affected)
    }

    /// Adds capacity over `[begin, end)`: every occupied unit not covered by
    /// a live allocation's spans becomes free. Units held by committed
    /// allocations are left occupied.
    pub fn set_available(&mut self, begin: i64, end: i64) -> Result<(), EngineError> {
        self.check_range(begin, end)?;
        self.extend_to(end)?;
        let clamped_begin = begin.max(self.horizon_begin);
        if end <= clamped_begin {
            return Ok(());
        }
        let mut covered = vec![false; (end - clamped_begin) as usize];
        for record in self.allocations.values() {
            for span in record.spans() {
                let overlap_begin = span.begin.max(clamped_begin);
                let overlap_end = span.end.min(end);
                for unit in overlap_begin..overlap_end {
                    covered[(unit - clamped_begin) as usize] = true;
                }
            }
        }
        for unit in clamped_begin..end {
            if !covered[(unit - clamped_begin) as usize] {
                self.bits[(unit - self.horizon_begin) as usize] = true;
            }
        }
        Ok(())
    }

    /// Captures the full observable engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            bits: self.bits.clone().into_boxed_slice(),
            allocations: self.allocations.clone(),
        }
    }

    /// Rolls the engine back to a snapshot. The snapshot must cover the same
    /// horizon length as the engine currently does.
    pub fn restore(&mut self, snapshot: &EngineSnapshot) -> Result<(), EngineError> {
        if snapshot.bits.len() != self.bits.len() {
            return Err(EngineError::SnapshotSize {
                snapshot_len: snapshot.bits.len(),
                engine_len: self.bits.len(),
            });
        }
        self.bits.copy_from_slice(&snapshot.bits);
        self.allocations = snapshot.allocations.clone();
        Ok(())
    }

    /// Extends the horizon forward by materialising further calendar days,
    /// leaving every existing bit untouched.
    fn extend_to(&mut self, target_end: i64) -> Result<(), EngineError> {
        if target_end <= self.horizon_end() {
            return Ok(());
        }
        let tail = render_calendar_bits(&self.calendar, self.epoch, self.horizon_end(), target_end)?;
        self.apply_extension(tail);
        Ok(())
    }

    fn apply_extension(&mut self, tail: Vec<bool>) {
        if tail.is_empty() {
            return;
        }
        info!(
            "extending horizon of resource {} from {} to {} units",
            self.resource_id,
            self.bits.len(),
            self.bits.len() + tail.len()
        );
        self.bits.extend(tail);
    }

    /// Absolute unit bound of a speculative search without a deadline: far
    /// enough past the horizon (and past the last dated exception) that the
    /// requested work fits if the pattern can ever supply it.
    fn lookahead_cap(&self, start_abs: i64, work_units: i64) -> i64 {
        let unit_seconds = self.calendar.resolution().unit_seconds();
        let weekly_units = self.calendar.pattern().weekly_working_seconds() / unit_seconds;
        let units_per_week = (WEEK_SECONDS + unit_seconds - 1) / unit_seconds;
        let margin_units = if weekly_units > 0 {
            (work_units / weekly_units + 2) * units_per_week
        } else {
            0
        };
        let mut cap = start_abs.max(self.horizon_end()) + margin_units;
        if let Some(last_exception) = self.calendar.pattern().last_exception_date() {
            let day_after = last_exception
                .succ_opt()
                .expect("calendar date overflow")
                .and_time(chrono::NaiveTime::MIN);
            let exception_cap_seconds = day_after.signed_duration_since(self.epoch).num_seconds();
            let exception_cap = (exception_cap_seconds + unit_seconds - 1) / unit_seconds;
            cap = cap.max(exception_cap + margin_units);
        }
        cap
    }

    fn fill(&mut self, begin: i64, end: i64, free: bool) {
        for unit in begin..end {
            self.bits[(unit - self.horizon_begin) as usize] = free;
        }
    }

    fn check_resource(&self, record: &AllocationRecord) -> Result<(), EngineError> {
        if record.resource_id() != &*self.resource_id {
            return Err(EngineError::ResourceMismatch {
                record_resource: record.resource_id().into(),
                engine_resource: self.resource_id.clone(),
            });
        }
        Ok(())
    }

    fn check_range(&self, begin: i64, end: i64) -> Result<(), EngineError> {
        if begin >= end {
            return Err(EngineError::InvalidRequest(
                format!("empty or inverted unit range [{}, {})", begin, end).into(),
            ));
        }
        Ok(())
    }
}

/// Renders the calendar's working time over `[from, to)` absolute units
/// into a fresh bit buffer. Fails if a period boundary does not align to
/// the resolution.
fn render_calendar_bits(
    calendar: &WorkCalendar,
    epoch: NaiveDateTime,
    from: i64,
    to: i64,
) -> Result<Vec<bool>, EngineError> {
    let resolution = calendar.resolution();
    let from_datetime = resolution.to_datetime(from, epoch);
    let to_datetime = resolution.to_datetime(to, epoch);
    let mut bits = vec![false; (to - from) as usize];
    for interval in calendar.working_intervals_in_range(from_datetime, to_datetime)? {
        let (begin, end) = interval?;
        let begin_unit = resolution.to_int(begin, epoch)?;
        let end_unit = resolution.to_int(end, epoch)?;
        for bit in &mut bits[(begin_unit - from) as usize..(end_unit - from) as usize] {
            *bit = true;
        }
    }
    Ok(bits)
}

/// Read-only view of the engine's bits that extends past the horizon into a
/// local buffer, one calendar week at a time, up to a fixed cap. This keeps
/// the slot finder free of engine mutation.
struct HorizonProbe<'e> {
    engine: &'e CapacityEngine,
    extension: Vec<bool>,
    cap: i64,
}

impl<'e> HorizonProbe<'e> {
    fn new(engine: &'e CapacityEngine, cap: i64) -> HorizonProbe<'e> {
        HorizonProbe {
            engine,
            extension: Vec::new(),
            cap,
        }
    }

    /// State of the relative unit `position`, materialising further weeks as
    /// needed. Callers keep `position` below the cap.
    fn bit(&mut self, position: i64) -> Result<bool, EngineError> {
        debug_assert!(position < self.cap);
        let horizon_len = self.engine.bits.len() as i64;
        if position < horizon_len {
            return Ok(self.engine.bits[position as usize]);
        }
        while horizon_len + (self.extension.len() as i64) <= position {
            self.materialise_week()?;
        }
        Ok(self.extension[(position - horizon_len) as usize])
    }

    fn materialise_week(&mut self) -> Result<(), EngineError> {
        let unit_seconds = self.engine.calendar.resolution().unit_seconds();
        let horizon_len = self.engine.bits.len() as i64;
        let from = horizon_len + self.extension.len() as i64;
        let to = (from + (WEEK_SECONDS + unit_seconds - 1) / unit_seconds).min(self.cap);
        let chunk = render_calendar_bits(
            &self.engine.calendar,
            self.engine.epoch,
            self.engine.horizon_begin + from,
            self.engine.horizon_begin + to,
        )?;
        self.extension.extend(chunk);
        Ok(())
    }
}

/// Iterator over the maximal equal-state runs of an engine's bits.
pub struct RunIterator<'a> {
    bits: &'a [bool],
    horizon_begin: i64,
    position: usize,
}

impl<'a> Iterator for RunIterator<'a> {
    type Item = Run;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.bits.len() {
            return None;
        }
        let free = self.bits[self.position];
        let begin = self.position;
        while self.position < self.bits.len() && self.bits[self.position] == free {
            self.position += 1;
        }
        Some(Run {
            begin: self.horizon_begin + begin as i64,
            end: self.horizon_begin + self.position as i64,
            free,
        })
    }
}
