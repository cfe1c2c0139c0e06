use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A candidate interval a service could be booked into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub available: bool,
}

impl TimeSlot {
    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && self.end > start
    }

    pub fn span(&self) -> SlotSpan {
        SlotSpan {
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SlotSpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}
