use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use super::check_auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Blackout, BusinessHours, Service, TimeSlot};
use crate::services::availability;
use crate::state::AppState;

const MAX_AVAILABILITY_DAYS: i64 = 31;

// GET /api/:business_id/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> Result<Json<Vec<Service>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    Ok(Json(queries::list_services(&db, &business_id, false)?))
}

// POST /api/:business_id/services
#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub duration_min: i64,
    #[serde(default)]
    pub buffer_min: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(req): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let service = Service {
        id: uuid::Uuid::new_v4().to_string(),
        business_id,
        name: req.name.trim().to_string(),
        duration_min: req.duration_min,
        buffer_min: req.buffer_min,
        enabled: req.enabled,
    };
    service
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    {
        let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
        queries::insert_service(&db, &service)?;
    }
    tracing::info!(business_id = %service.business_id, service_id = %service.id, "service created");

    Ok((StatusCode::CREATED, Json(service)))
}

// PUT /api/:business_id/services/:id
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
    Json(req): Json<CreateServiceRequest>,
) -> Result<Json<Service>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let service = Service {
        id,
        business_id,
        name: req.name.trim().to_string(),
        duration_min: req.duration_min,
        buffer_min: req.buffer_min,
        enabled: req.enabled,
    };
    service
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let updated = {
        let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
        queries::update_service(&db, &service)?
    };
    if !updated {
        return Err(AppError::NotFound(format!("service {}", service.id)));
    }
    tracing::info!(
        business_id = %service.business_id,
        service_id = %service.id,
        enabled = service.enabled,
        "service updated"
    );

    Ok(Json(service))
}

// DELETE /api/:business_id/services/:id
pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    if !queries::delete_service(&db, &id, &business_id)? {
        return Err(AppError::NotFound(format!("service {id}")));
    }
    tracing::info!(business_id = %business_id, service_id = %id, "service deleted");
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/:business_id/hours
pub async fn get_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> Result<Json<Vec<BusinessHours>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    Ok(Json(queries::get_business_hours(&db, &business_id)?))
}

// PUT /api/:business_id/hours/:weekday
#[derive(Deserialize)]
pub struct HoursRequest {
    pub open: Option<String>,
    pub close: Option<String>,
    #[serde(default)]
    pub is_closed: bool,
}

pub async fn put_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, weekday)): Path<(String, u8)>,
    Json(req): Json<HoursRequest>,
) -> Result<Json<BusinessHours>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let hours = BusinessHours {
        business_id,
        weekday,
        open: req.open,
        close: req.close,
        is_closed: req.is_closed,
    };
    hours
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    queries::upsert_business_hours(&db, &hours)?;
    Ok(Json(hours))
}

// GET /api/:business_id/blackouts
pub async fn list_blackouts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> Result<Json<Vec<Blackout>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    Ok(Json(queries::list_blackouts(&db, &business_id)?))
}

// POST /api/:business_id/blackouts
#[derive(Deserialize)]
pub struct CreateBlackoutRequest {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: String,
}

pub async fn create_blackout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(req): Json<CreateBlackoutRequest>,
) -> Result<(StatusCode, Json<Blackout>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if req.end_date.is_some_and(|end| end < req.start_date) {
        return Err(AppError::Validation(
            "end_date must not be before start_date".to_string(),
        ));
    }

    let blackout = Blackout {
        id: uuid::Uuid::new_v4().to_string(),
        business_id,
        start_date: req.start_date,
        end_date: req.end_date,
        reason: req.reason,
    };

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    queries::insert_blackout(&db, &blackout)?;
    Ok((StatusCode::CREATED, Json(blackout)))
}

// DELETE /api/:business_id/blackouts/:id
pub async fn delete_blackout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    if !queries::delete_blackout(&db, &id, &business_id)? {
        return Err(AppError::NotFound(format!("blackout {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/:business_id/availability
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub service_id: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<TimeSlot>>, AppError> {
    let end_date = query
        .end_date
        .unwrap_or(query.start_date + Duration::days(6));
    if end_date < query.start_date {
        return Err(AppError::Validation(
            "end_date must not be before start_date".to_string(),
        ));
    }
    if (end_date - query.start_date).num_days() >= MAX_AVAILABILITY_DAYS {
        return Err(AppError::Validation(format!(
            "date range must not exceed {MAX_AVAILABILITY_DAYS} days"
        )));
    }

    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    let slots = availability::available_slots(
        &db,
        &business_id,
        &query.service_id,
        query.start_date,
        end_date,
    )?;
    Ok(Json(slots))
}
