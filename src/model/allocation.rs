use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous half-open interval `[begin, end)` of absolute engine units
/// consumed by a single allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub begin: i64,
    pub end: i64,
}

impl Span {
    pub fn new(begin: i64, end: i64) -> Span {
        debug_assert!(begin < end, "Span::new: empty or inverted span [{}, {})", begin, end);
        Span { begin, end }
    }
    pub fn len(&self) -> i64 {
        self.end - self.begin
    }
    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
    /// Whether this span and `[begin, end)` share at least one unit.
    pub fn intersects(&self, begin: i64, end: i64) -> bool {
        self.begin < end && begin < self.end
    }
    pub fn contains(&self, unit: i64) -> bool {
        unit >= self.begin && unit < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Immutable description of one committed or candidate allocation on one
/// resource. Records are created by the slot finder and are plain values:
/// callers may hold or persist them after the allocation has been released,
/// and a record is self-sufficient for release.
///
/// Invariants: spans are sorted, strictly disjoint, their lengths sum to
/// `work_units`, the first span starts at `begin` and the last ends at `end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    operation_id: Box<str>,
    resource_id: Box<str>,
    begin: i64,
    end: i64,
    work_units: i64,
    allow_split: bool,
    spans: Box<[Span]>,
}

impl AllocationRecord {
    pub(crate) fn new(
        operation_id: &str,
        resource_id: &str,
        work_units: i64,
        allow_split: bool,
        spans: Vec<Span>,
    ) -> AllocationRecord {
        debug_assert!(!spans.is_empty(), "AllocationRecord::new: no spans");
        debug_assert!(
            spans.windows(2).all(|w| w[0].end < w[1].begin),
            "AllocationRecord::new: spans not strictly increasing and disjoint: {:?}",
            spans
        );
        debug_assert_eq!(
            spans.iter().map(Span::len).sum::<i64>(),
            work_units,
            "AllocationRecord::new: span lengths do not sum to the work units"
        );
        AllocationRecord {
            operation_id: operation_id.into(),
            resource_id: resource_id.into(),
            begin: spans[0].begin,
            end: spans[spans.len() - 1].end,
            work_units,
            allow_split,
            spans: spans.into_boxed_slice(),
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }
    /// First occupied absolute unit.
    pub fn begin(&self) -> i64 {
        self.begin
    }
    /// One past the last occupied absolute unit.
    pub fn end(&self) -> i64 {
        self.end
    }
    pub fn work_units(&self) -> i64 {
        self.work_units
    }
    pub fn allow_split(&self) -> bool {
        self.allow_split
    }
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }
    /// Elapsed units between the first and last occupied unit, idle gaps
    /// included.
    pub fn wall_time(&self) -> i64 {
        self.end - self.begin
    }

    /// Whether any span shares a unit with `[begin, end)`.
    pub fn intersects(&self, begin: i64, end: i64) -> bool {
        self.spans.iter().any(|s| s.intersects(begin, end))
    }
    pub fn covers_unit(&self, unit: i64) -> bool {
        self.spans.iter().any(|s| s.contains(unit))
    }
}
