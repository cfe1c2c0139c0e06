use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::check_auth;
use crate::errors::AppError;
use crate::models::{Booking, BookingFilter, BookingStatus, Customer, NewBooking, Paging};
use crate::services::ledger;
use crate::state::AppState;

// GET /api/:business_id/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let filter = BookingFilter {
        start_date: query.start_date,
        end_date: query.end_date,
        status: query.status,
    };
    let defaults = Paging::default();
    let paging = Paging {
        limit: query.limit.unwrap_or(defaults.limit),
        skip: query.skip.unwrap_or(defaults.skip),
    };

    let bookings = {
        let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
        ledger::list_bookings(&db, &business_id, &filter, paging)?
    };
    Ok(Json(bookings))
}

// POST /api/:business_id/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub customer: Customer,
    pub thread_id: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = {
        let mut db = state.db.lock().unwrap_or_else(|e| e.into_inner());
        ledger::create_booking(
            &mut db,
            NewBooking {
                business_id,
                service_id: req.service_id,
                start: req.start,
                end: req.end,
                customer: req.customer,
                thread_id: req.thread_id,
            },
        )?
    };
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/:business_id/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    Ok(Json(ledger::get_booking(&db, &id, &business_id)?))
}

// POST /api/:business_id/bookings/:id/status
#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: BookingStatus,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    Ok(Json(ledger::update_status(&db, &id, &business_id, req.status)?))
}

// GET /api/:business_id/threads/:thread_id/bookings
pub async fn thread_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, thread_id)): Path<(String, String)>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    Ok(Json(ledger::bookings_for_thread(&db, &business_id, &thread_id)?))
}

// DELETE /api/:business_id/bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    ledger::delete_booking(&db, &id, &business_id)?;
    Ok(StatusCode::NO_CONTENT)
}
