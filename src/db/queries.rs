use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Blackout, Booking, BookingFilter, BookingSlot, BookingStatus, BookingStep, BusinessHours,
    ConversationMessage, ConversationSession, Customer, Paging, Service,
};

pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).with_context(|| format!("invalid timestamp: {s}"))
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("invalid date: {s}"))
}

// ── Services ──

pub fn insert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, business_id, name, duration_min, buffer_min, enabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            service.id,
            service.business_id,
            service.name,
            service.duration_min,
            service.buffer_min,
            service.enabled,
        ],
    )?;
    Ok(())
}

/// Rewrites the editable fields of a service owned by `service.business_id`.
pub fn update_service(conn: &Connection, service: &Service) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE services SET name = ?1, duration_min = ?2, buffer_min = ?3, enabled = ?4
         WHERE id = ?5 AND business_id = ?6",
        params![
            service.name,
            service.duration_min,
            service.buffer_min,
            service.enabled,
            service.id,
            service.business_id,
        ],
    )?;
    Ok(count > 0)
}

pub fn delete_service(conn: &Connection, id: &str, business_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM services WHERE id = ?1 AND business_id = ?2",
        params![id, business_id],
    )?;
    Ok(count > 0)
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, business_id, name, duration_min, buffer_min, enabled
             FROM services WHERE id = ?1",
            params![id],
            service_from_row,
        )
        .optional()?;
    Ok(service)
}

pub fn list_services(
    conn: &Connection,
    business_id: &str,
    enabled_only: bool,
) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, business_id, name, duration_min, buffer_min, enabled
         FROM services WHERE business_id = ?1 AND (enabled = 1 OR ?2 = 0)
         ORDER BY created_at ASC, name ASC",
    )?;

    let rows = stmt.query_map(params![business_id, enabled_only], service_from_row)?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

fn service_from_row(row: &rusqlite::Row) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        duration_min: row.get(3)?,
        buffer_min: row.get(4)?,
        enabled: row.get(5)?,
    })
}

// ── Business Hours ──

pub fn upsert_business_hours(conn: &Connection, hours: &BusinessHours) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO business_hours (business_id, weekday, open, close, is_closed)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(business_id, weekday) DO UPDATE SET
           open = excluded.open,
           close = excluded.close,
           is_closed = excluded.is_closed",
        params![
            hours.business_id,
            hours.weekday,
            hours.open,
            hours.close,
            hours.is_closed,
        ],
    )?;
    Ok(())
}

pub fn get_business_hours(conn: &Connection, business_id: &str) -> anyhow::Result<Vec<BusinessHours>> {
    let mut stmt = conn.prepare(
        "SELECT business_id, weekday, open, close, is_closed
         FROM business_hours WHERE business_id = ?1 ORDER BY weekday ASC",
    )?;

    let rows = stmt.query_map(params![business_id], |row| {
        Ok(BusinessHours {
            business_id: row.get(0)?,
            weekday: row.get(1)?,
            open: row.get(2)?,
            close: row.get(3)?,
            is_closed: row.get(4)?,
        })
    })?;

    let mut hours = vec![];
    for row in rows {
        hours.push(row?);
    }
    Ok(hours)
}

// ── Blackouts ──

pub fn insert_blackout(conn: &Connection, blackout: &Blackout) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO blackouts (id, business_id, start_date, end_date, reason)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            blackout.id,
            blackout.business_id,
            blackout.start_date.format(DATE_FORMAT).to_string(),
            blackout
                .end_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
            blackout.reason,
        ],
    )?;
    Ok(())
}

pub fn list_blackouts(conn: &Connection, business_id: &str) -> anyhow::Result<Vec<Blackout>> {
    query_blackouts(
        conn,
        "SELECT id, business_id, start_date, end_date, reason
         FROM blackouts WHERE business_id = ?1 ORDER BY start_date ASC",
        params![business_id],
    )
}

/// Blackouts touching any day of `[start, end]`.
pub fn get_blackouts_in_range(
    conn: &Connection,
    business_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<Blackout>> {
    query_blackouts(
        conn,
        "SELECT id, business_id, start_date, end_date, reason
         FROM blackouts
         WHERE business_id = ?1 AND start_date <= ?3 AND COALESCE(end_date, start_date) >= ?2
         ORDER BY start_date ASC",
        params![
            business_id,
            start.format(DATE_FORMAT).to_string(),
            end.format(DATE_FORMAT).to_string(),
        ],
    )
}

fn query_blackouts(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> anyhow::Result<Vec<Blackout>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        let start_date: String = row.get(2)?;
        let end_date: Option<String> = row.get(3)?;
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            start_date,
            end_date,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut blackouts = vec![];
    for row in rows {
        let (id, business_id, start_date, end_date, reason) = row?;
        blackouts.push(Blackout {
            id,
            business_id,
            start_date: parse_date(&start_date)?,
            end_date: end_date.as_deref().map(parse_date).transpose()?,
            reason,
        });
    }
    Ok(blackouts)
}

pub fn delete_blackout(conn: &Connection, id: &str, business_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM blackouts WHERE id = ?1 AND business_id = ?2",
        params![id, business_id],
    )?;
    Ok(count > 0)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, business_id, service_id, start_at, end_at, customer_name, customer_phone, status, thread_id, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, business_id, service_id, start_at, end_at, customer_name, customer_phone, status, thread_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            booking.id,
            booking.business_id,
            booking.service_id,
            format_ts(&booking.start),
            format_ts(&booking.end),
            booking.customer.name,
            booking.customer.phone,
            booking.status.as_str(),
            booking.thread_id,
            format_ts(&booking.created_at),
            format_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Id of a pending or confirmed booking overlapping `[start, end)`, if any.
pub fn find_overlapping_booking(
    conn: &Connection,
    business_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM bookings
         WHERE business_id = ?1 AND status IN ('pending', 'confirmed')
           AND start_at < ?3 AND end_at > ?2
         ORDER BY start_at ASC LIMIT 1",
        params![business_id, format_ts(start), format_ts(end)],
        |row| row.get(0),
    )
    .optional()
}

pub fn get_active_bookings_in_range(
    conn: &Connection,
    business_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE business_id = ?1 AND status IN ('pending', 'confirmed')
           AND start_at < ?3 AND end_at > ?2
         ORDER BY start_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![business_id, format_ts(start), format_ts(end)],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_booking(conn: &Connection, id: &str, business_id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1 AND business_id = ?2");
    let result = conn
        .query_row(&sql, params![id, business_id], |row| Ok(parse_booking_row(row)))
        .optional()?;

    result.transpose()
}

pub fn list_bookings(
    conn: &Connection,
    business_id: &str,
    filter: &BookingFilter,
    paging: Paging,
) -> anyhow::Result<Vec<Booking>> {
    let mut sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE business_id = ?");
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(business_id.to_string())];

    if let Some(start_date) = filter.start_date {
        sql.push_str(" AND start_at >= ?");
        params_vec.push(Box::new(format_ts(&start_date.and_time(chrono::NaiveTime::MIN))));
    }
    if let Some(end_date) = filter.end_date {
        let next_day = end_date + Duration::days(1);
        sql.push_str(" AND start_at < ?");
        params_vec.push(Box::new(format_ts(&next_day.and_time(chrono::NaiveTime::MIN))));
    }
    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        params_vec.push(Box::new(status.as_str()));
    }
    sql.push_str(" ORDER BY start_at ASC LIMIT ? OFFSET ?");
    params_vec.push(Box::new(paging.limit));
    params_vec.push(Box::new(paging.skip));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_bookings_for_thread(
    conn: &Connection,
    business_id: &str,
    thread_id: &str,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE business_id = ?1 AND thread_id = ?2 ORDER BY start_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![business_id, thread_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    business_id: &str,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let now = format_ts(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND business_id = ?4",
        params![status.as_str(), now, id, business_id],
    )?;
    Ok(count > 0)
}

pub fn delete_booking(conn: &Connection, id: &str, business_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM bookings WHERE id = ?1 AND business_id = ?2",
        params![id, business_id],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_str: String = row.get(3)?;
    let end_str: String = row.get(4)?;
    let status_str: String = row.get(7)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown booking status: {status_str}"))?;

    Ok(Booking {
        id: row.get(0)?,
        business_id: row.get(1)?,
        service_id: row.get(2)?,
        start: parse_ts(&start_str)?,
        end: parse_ts(&end_str)?,
        customer: Customer {
            name: row.get(5)?,
            phone: row.get(6)?,
        },
        status,
        thread_id: row.get(8)?,
        created_at: parse_ts(&created_at_str)?,
        updated_at: parse_ts(&updated_at_str)?,
    })
}

// ── Booking Sessions ──

pub fn get_session(
    conn: &Connection,
    business_id: &str,
    thread_id: &str,
) -> anyhow::Result<Option<ConversationSession>> {
    let row = conn
        .query_row(
            "SELECT step, slot, updated_at FROM booking_sessions
             WHERE business_id = ?1 AND thread_id = ?2",
            params![business_id, thread_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((step_str, slot_json, updated_at_str)) = row else {
        return Ok(None);
    };

    let slot: BookingSlot = match serde_json::from_str(&slot_json) {
        Ok(slot) => slot,
        Err(e) => {
            tracing::warn!(business_id, thread_id, error = %e, "unreadable session slot, starting over");
            BookingSlot::default()
        }
    };

    Ok(Some(ConversationSession {
        business_id: business_id.to_string(),
        thread_id: thread_id.to_string(),
        step: BookingStep::parse(&step_str),
        slot,
        updated_at: parse_ts(&updated_at_str)?,
    }))
}

pub fn save_session(conn: &Connection, session: &ConversationSession) -> anyhow::Result<()> {
    let slot_json = serde_json::to_string(&session.slot)?;

    conn.execute(
        "INSERT INTO booking_sessions (business_id, thread_id, step, slot, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(business_id, thread_id) DO UPDATE SET
           step = excluded.step,
           slot = excluded.slot,
           updated_at = excluded.updated_at",
        params![
            session.business_id,
            session.thread_id,
            session.step.as_str(),
            slot_json,
            format_ts(&session.updated_at),
        ],
    )?;
    Ok(())
}

pub fn delete_session(conn: &Connection, business_id: &str, thread_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM booking_sessions WHERE business_id = ?1 AND thread_id = ?2",
        params![business_id, thread_id],
    )?;
    Ok(count > 0)
}

pub fn expire_stale_sessions(conn: &Connection, cutoff: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM booking_sessions WHERE updated_at < ?1",
        params![format_ts(cutoff)],
    )?;
    Ok(count)
}

// ── Messages ──

pub fn insert_message(
    conn: &Connection,
    business_id: &str,
    thread_id: &str,
    role: &str,
    content: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO messages (business_id, thread_id, role, content) VALUES (?1, ?2, ?3, ?4)",
        params![business_id, thread_id, role, content],
    )?;
    Ok(())
}

/// The latest `limit` messages of a thread, oldest first.
pub fn get_recent_messages(
    conn: &Connection,
    business_id: &str,
    thread_id: &str,
    limit: usize,
) -> anyhow::Result<Vec<ConversationMessage>> {
    let mut stmt = conn.prepare(
        "SELECT role, content FROM messages
         WHERE business_id = ?1 AND thread_id = ?2
         ORDER BY id DESC LIMIT ?3",
    )?;

    let rows = stmt.query_map(params![business_id, thread_id, limit as i64], |row| {
        Ok(ConversationMessage {
            role: row.get(0)?,
            content: row.get(1)?,
        })
    })?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row?);
    }
    messages.reverse();
    Ok(messages)
}
