use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub business_id: String,
    pub service_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub customer: Customer,
    pub status: BookingStatus,
    pub thread_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields supplied to the ledger when a booking is requested.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub business_id: String,
    pub service_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub customer: Customer,
    #[serde(default)]
    pub thread_id: Option<String>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub start_date: Option<NaiveDate>,
    /// Inclusive: bookings starting any time on this day match.
    pub end_date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub limit: i64,
    pub skip: i64,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Pending and confirmed bookings occupy their interval.
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}
