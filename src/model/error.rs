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

//! Error taxonomy of the calendar and engine layers.
//!
//! Every error is surfaced to the caller; nothing is retried internally, and a
//! failed operation leaves the observable state of the calendar or engine
//! unchanged. Zone-aware datetimes cannot reach these errors: the boundary
//! only accepts [`chrono::NaiveDateTime`].

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use thiserror::Error;

/// Errors raised by the working-calendar layer: resolution conversion,
/// pattern construction, the day-period resolver and the lazy walks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    /// A datetime does not sit on the unit grid of the active resolution.
    #[error("datetime {datetime} does not align to the {label} resolution ({residual_seconds}s past the previous unit)")]
    Misalignment {
        datetime: NaiveDateTime,
        label: Box<str>,
        residual_seconds: i64,
    },
    /// A weekly rule is malformed or overlaps another rule on the same day
    /// once overnight rules have been split.
    #[error("invalid weekly rule on day {day_of_week}: {reason}")]
    InvalidRule { day_of_week: u8, reason: Box<str> },
    /// A dated exception is malformed, or a working window overlaps an
    /// existing period of its day.
    #[error("invalid exception on {date}: {reason}")]
    InvalidException { date: NaiveDate, reason: Box<str> },
    /// A walk ran out of reachable working time.
    #[error("no reachable working time: {units_remaining} of {units_requested} units left unplaced")]
    Infeasible {
        units_requested: i64,
        units_remaining: i64,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(Box<str>),
}

/// Why a slot search could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfeasibleReason {
    /// The caller-supplied deadline was reached first.
    Deadline,
    /// The bounded horizon lookahead was exhausted.
    Horizon,
}

impl fmt::Display for InfeasibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfeasibleReason::Deadline => write!(f, "deadline"),
            InfeasibleReason::Horizon => write!(f, "horizon"),
        }
    }
}

/// Errors raised by the capacity engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A slot search cannot place the requested work before its bound.
    #[error("operation {operation_id} cannot be placed before the {reason} ({work_units_remaining} of {work_units_requested} units unplaced)")]
    Infeasible {
        operation_id: Box<str>,
        work_units_requested: i64,
        work_units_remaining: i64,
        reason: InfeasibleReason,
    },
    /// An allocation record was applied to an engine of another resource.
    #[error("record for resource {record_resource} applied to the engine of resource {engine_resource}")]
    ResourceMismatch {
        record_resource: Box<str>,
        engine_resource: Box<str>,
    },
    /// A snapshot no longer matches the engine horizon length.
    #[error("snapshot holds {snapshot_len} units but the engine horizon holds {engine_len}")]
    SnapshotSize {
        snapshot_len: usize,
        engine_len: usize,
    },
    /// Double commit, release of an unknown record, or commit of a record
    /// whose spans are no longer free.
    #[error("invalid operation on {operation_id}: {reason}")]
    InvalidOperation {
        operation_id: Box<str>,
        reason: Box<str>,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(Box<str>),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}
