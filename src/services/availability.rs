use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::schedule::weekday_index;
use crate::models::{Blackout, Booking, BusinessHours, Service, TimeSlot};

/// Every candidate slot for `service` on each day of `[start_date, end_date]`, in
/// chronological order. Slots start at opening time and are spaced by duration plus
/// buffer; a slot that would run past closing time is not offered.
pub fn generate_slots(
    service: &Service,
    hours: &[BusinessHours],
    blackouts: &[Blackout],
    bookings: &[Booking],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Vec<TimeSlot> {
    let mut slots = vec![];
    let span = service.duration_min.checked_add(service.buffer_min);
    let (Some(duration), Some(step)) = (
        Duration::try_minutes(service.duration_min),
        span.and_then(Duration::try_minutes),
    ) else {
        return slots;
    };
    if duration <= Duration::zero() || step <= Duration::zero() {
        return slots;
    }

    for date in start_date.iter_days().take_while(|d| *d <= end_date) {
        let weekday = weekday_index(date);
        let Some((open, close)) = hours
            .iter()
            .find(|h| h.weekday == weekday)
            .and_then(BusinessHours::window)
        else {
            continue;
        };

        let blacked_out = blackouts.iter().any(|b| b.covers(date));
        let close_at = date.and_time(close);
        let mut start = date.and_time(open);

        while let Some(end) = start.checked_add_signed(duration).filter(|end| *end <= close_at) {
            let booked = bookings
                .iter()
                .any(|b| b.status.is_active() && b.start < end && b.end > start);
            slots.push(TimeSlot {
                start,
                end,
                available: !blacked_out && !booked,
            });
            match start.checked_add_signed(step) {
                Some(next) => start = next,
                None => break,
            }
        }
    }

    slots
}

/// Whether `[start, end)` can still be booked for the service. A service that is
/// unknown, disabled or owned by another business is never available.
pub fn is_slot_available(
    conn: &Connection,
    business_id: &str,
    service_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<bool> {
    match queries::get_service(conn, service_id)? {
        Some(service) if service.business_id == business_id && service.enabled => {}
        _ => return Ok(false),
    }
    let clash = queries::find_overlapping_booking(conn, business_id, start, end)?;
    Ok(clash.is_none())
}

/// All candidate slots, flagged, with schedule facts loaded from the store.
pub fn load_slots(
    conn: &Connection,
    service: &Service,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> anyhow::Result<Vec<TimeSlot>> {
    let hours = queries::get_business_hours(conn, &service.business_id)?;
    let blackouts =
        queries::get_blackouts_in_range(conn, &service.business_id, start_date, end_date)?;
    let range_start = start_date.and_time(NaiveTime::MIN);
    let range_end = (end_date + Duration::days(1)).and_time(NaiveTime::MIN);
    let bookings = queries::get_active_bookings_in_range(
        conn,
        &service.business_id,
        &range_start,
        &range_end,
    )?;

    Ok(generate_slots(
        service, &hours, &blackouts, &bookings, start_date, end_date,
    ))
}

/// Bookable slots only, for a service of this business.
pub fn available_slots(
    conn: &Connection,
    business_id: &str,
    service_id: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<TimeSlot>, AppError> {
    let service = queries::get_service(conn, service_id)?
        .filter(|s| s.business_id == business_id && s.enabled)
        .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))?;

    let slots = load_slots(conn, &service, start_date, end_date)?;
    Ok(slots.into_iter().filter(|s| s.available).collect())
}
