use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingFilter, BookingStatus, NewBooking, Paging};

/// Persists a pending booking. The overlap check and the insert run in one
/// immediate transaction, so two writers can never both claim the same interval.
pub fn create_booking(conn: &mut Connection, new: NewBooking) -> Result<Booking, AppError> {
    let name = new.customer.name.trim();
    let phone = new.customer.phone.trim();
    if name.is_empty() {
        return Err(AppError::Validation("customer name is required".to_string()));
    }
    if phone.is_empty() {
        return Err(AppError::Validation("customer phone is required".to_string()));
    }
    if new.end <= new.start {
        return Err(AppError::Validation("end must be after start".to_string()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let service = queries::get_service(&tx, &new.service_id)?
        .filter(|s| s.business_id == new.business_id)
        .ok_or_else(|| AppError::NotFound(format!("service {}", new.service_id)))?;

    if !service.enabled {
        return Err(AppError::Conflict(format!(
            "service {} is not accepting bookings",
            service.name
        )));
    }

    if let Some(existing) =
        queries::find_overlapping_booking(&tx, &new.business_id, &new.start, &new.end)?
    {
        tracing::info!(
            business_id = %new.business_id,
            existing_booking = %existing,
            start = %new.start,
            "booking rejected: slot already taken"
        );
        return Err(AppError::Conflict(
            "that time slot is no longer available".to_string(),
        ));
    }

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        business_id: new.business_id,
        service_id: new.service_id,
        start: new.start,
        end: new.end,
        customer: crate::models::Customer {
            name: name.to_string(),
            phone: phone.to_string(),
        },
        status: BookingStatus::Pending,
        thread_id: new.thread_id,
        created_at: now,
        updated_at: now,
    };

    queries::insert_booking(&tx, &booking)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        business_id = %booking.business_id,
        start = %booking.start,
        "booking created"
    );

    Ok(booking)
}

pub fn get_booking(conn: &Connection, id: &str, business_id: &str) -> Result<Booking, AppError> {
    queries::get_booking(conn, id, business_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

pub fn update_status(
    conn: &Connection,
    id: &str,
    business_id: &str,
    status: BookingStatus,
) -> Result<Booking, AppError> {
    if !queries::update_booking_status(conn, id, business_id, status)? {
        return Err(AppError::NotFound(format!("booking {id}")));
    }
    tracing::info!(booking_id = %id, status = status.as_str(), "booking status updated");
    get_booking(conn, id, business_id)
}

pub fn delete_booking(conn: &Connection, id: &str, business_id: &str) -> Result<(), AppError> {
    if !queries::delete_booking(conn, id, business_id)? {
        return Err(AppError::NotFound(format!("booking {id}")));
    }
    tracing::info!(booking_id = %id, "booking deleted");
    Ok(())
}

pub fn list_bookings(
    conn: &Connection,
    business_id: &str,
    filter: &BookingFilter,
    paging: Paging,
) -> Result<Vec<Booking>, AppError> {
    if paging.limit < 0 || paging.skip < 0 {
        return Err(AppError::Validation(
            "limit and skip must not be negative".to_string(),
        ));
    }
    Ok(queries::list_bookings(conn, business_id, filter, paging)?)
}

/// Bookings a chat thread produced, oldest appointment first.
pub fn bookings_for_thread(
    conn: &Connection,
    business_id: &str,
    thread_id: &str,
) -> Result<Vec<Booking>, AppError> {
    Ok(queries::get_bookings_for_thread(conn, business_id, thread_id)?)
}
