//! Conversion between wall-clock datetimes and dimensionless unit counts.

use crate::model::error::CalendarError;
use chrono::{Duration, NaiveDateTime};
use lazy_static::lazy_static;
use std::collections::HashMap;

// Resolutions addressable by label in fixture documents.
const NAMED_UNITS_ARRAY: [(&str, i64); 2] = [("minute", 60), ("hour", 3600)];
lazy_static! {
    static ref NAMED_UNITS: HashMap<&'static str, i64> = HashMap::from_iter(NAMED_UNITS_ARRAY);
}

/// The atomic interval of the integer time domain. A resolution is a pure
/// performance parameter: nothing above the conversion boundary references
/// it, and the engine only ever sees unit counts relative to an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    unit_seconds: i64,
    label: Box<str>,
}

impl Resolution {
    /// Creates a resolution of `unit_seconds` per unit.
    /// Fails with [`CalendarError::InvalidArgument`] if `unit_seconds < 1`.
    pub fn new(unit_seconds: i64, label: &str) -> Result<Resolution, CalendarError> {
        if unit_seconds < 1 {
            return Err(CalendarError::InvalidArgument(
                format!("resolution {} must have at least one second per unit, got {}", label, unit_seconds).into(),
            ));
        }
        Ok(Resolution {
            unit_seconds,
            label: label.into(),
        })
    }

    pub fn minute() -> Resolution {
        Resolution {
            unit_seconds: 60,
            label: "minute".into(),
        }
    }
    pub fn hour() -> Resolution {
        Resolution {
            unit_seconds: 3600,
            label: "hour".into(),
        }
    }
    /// Looks a resolution up by its fixture label ("minute", "hour").
    pub fn from_label(label: &str) -> Option<Resolution> {
        NAMED_UNITS.get(label).map(|unit_seconds| Resolution {
            unit_seconds: *unit_seconds,
            label: label.into(),
        })
    }

    pub fn unit_seconds(&self) -> i64 {
        self.unit_seconds
    }
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Converts a naive datetime into a unit count relative to `epoch`.
    /// Datetimes before the epoch yield negative counts. Fails with
    /// [`CalendarError::Misalignment`] if the delta is not a whole number of
    /// units, including any sub-second component.
    pub fn to_int(&self, datetime: NaiveDateTime, epoch: NaiveDateTime) -> Result<i64, CalendarError> {
        let delta = datetime.signed_duration_since(epoch);
        if delta.subsec_nanos() != 0 {
            return Err(CalendarError::Misalignment {
                datetime,
                label: self.label.clone(),
                residual_seconds: delta.num_seconds().rem_euclid(self.unit_seconds),
            });
        }
        let seconds = delta.num_seconds();
        if seconds.rem_euclid(self.unit_seconds) != 0 {
            return Err(CalendarError::Misalignment {
                datetime,
                label: self.label.clone(),
                residual_seconds: seconds.rem_euclid(self.unit_seconds),
            });
        }
        Ok(seconds.div_euclid(self.unit_seconds))
    }

    /// Converts a unit count back into the naive datetime `epoch + n units`.
    /// Exact inverse of [`Resolution::to_int`] on aligned input.
    pub fn to_datetime(&self, units: i64, epoch: NaiveDateTime) -> NaiveDateTime {
        epoch + Duration::seconds(units * self.unit_seconds)
    }
}
