//! Booking endpoints.
//!
//! `/api/booking` is the public contract used by the booking page: anyone
//! may list and create bookings there. `/api/v1/bookings` is the
//! authenticated variant where customers only see their own bookings.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::pagination::{Paginated, Pagination};
use super::validation::{validate_booking, validate_status_filter};
use crate::booking::{self, ModuleSelection, MonthGrid, Quote, TimeSlot, VehicleSize, TIME_SLOTS};
use crate::db::{
    Booking, BookingListQuery, BookingStatus, CreateBookingRequest, NewBooking,
    UpdateBookingStatusRequest,
};
use crate::AppState;

/// Filters shared by the public and authenticated list endpoints
#[derive(Debug, Default)]
struct BookingFilter {
    status: Option<BookingStatus>,
    date: Option<NaiveDate>,
    user_id: Option<Uuid>,
}

impl BookingFilter {
    fn from_query(query: &BookingListQuery, user_id: Option<Uuid>) -> Result<Self, ApiError> {
        let status = validate_status_filter(&query.status)
            .map_err(|e| ApiError::validation_field("status", e))?;
        let date = match query.date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(date) => Some(booking::parse_booking_date(date)?),
        };
        Ok(Self {
            status,
            date,
            user_id,
        })
    }
}

async fn fetch_bookings(
    state: &AppState,
    filter: BookingFilter,
    pagination: Pagination,
) -> Result<Paginated<Booking>, ApiError> {
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM bookings
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::date IS NULL OR booking_date = $2)
          AND ($3::uuid IS NULL OR user_id = $3)
        "#,
    )
    .bind(status)
    .bind(filter.date)
    .bind(filter.user_id)
    .fetch_one(&state.db)
    .await?;

    let bookings: Vec<Booking> = sqlx::query_as(
        r#"
        SELECT * FROM bookings
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::date IS NULL OR booking_date = $2)
          AND ($3::uuid IS NULL OR user_id = $3)
        ORDER BY booking_date DESC, created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(status)
    .bind(filter.date)
    .bind(filter.user_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(bookings, pagination, total))
}

async fn insert_booking(state: &AppState, booking: NewBooking) -> Result<Booking, ApiError> {
    let created: Booking = sqlx::query_as(
        r#"
        INSERT INTO bookings (
            user_id, vehicle_id, booking_date, time_slot, car_model, package_name,
            selected_modules, total_price, customer_name, customer_email, customer_phone, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(booking.user_id)
    .bind(booking.vehicle_id)
    .bind(booking.booking_date)
    .bind(&booking.time_slot)
    .bind(&booking.car_model)
    .bind(&booking.package_name)
    .bind(SqlJson(&booking.selected_modules))
    .bind(booking.total_price)
    .bind(&booking.customer_name)
    .bind(&booking.customer_email)
    .bind(&booking.customer_phone)
    .bind(&booking.notes)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        booking_id = %created.id,
        date = %created.booking_date,
        time = %created.time_slot,
        package = %created.package_name,
        total_price = created.total_price,
        "Booking created"
    );

    Ok(created)
}

async fn find_booking(state: &AppState, id: Uuid) -> Result<Booking, ApiError> {
    let booking: Option<Booking> = sqlx::query_as("SELECT * FROM bookings WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;

    booking.ok_or_else(|| ApiError::not_found("Booking not found"))
}

/// Customers only see their own bookings; others get a 404
fn ensure_visible(auth: &AuthUser, booking: &Booking) -> Result<(), ApiError> {
    if auth.is_staff() || booking.user_id == Some(auth.id) {
        Ok(())
    } else {
        Err(ApiError::not_found("Booking not found"))
    }
}

// -------------------------------------------------------------------------
// Public booking endpoint
// -------------------------------------------------------------------------

/// GET /api/booking
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<BookingListQuery>,
) -> Result<Json<Paginated<Booking>>, ApiError> {
    let filter = BookingFilter::from_query(&query, None)?;
    let pagination = Pagination::new(query.page, query.limit);
    Ok(Json(fetch_bookings(&state, filter, pagination).await?))
}

/// POST /api/booking
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let mut booking = validate_booking(&request, None)?;
    // Anonymous bookings cannot reference a stored vehicle
    booking.vehicle_id = None;

    let created = insert_booking(&state, booking).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Fallback for any other method on /api/booking
pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarResponse {
    #[serde(flatten)]
    pub grid: MonthGrid,
    pub time_slots: &'static [TimeSlot],
}

/// GET /api/booking/calendar
pub async fn calendar(
    ApiQuery(query): ApiQuery<CalendarQuery>,
) -> Result<Json<CalendarResponse>, ApiError> {
    let today = Utc::now().date_naive();
    let grid = booking::month_grid(
        query.year.unwrap_or_else(|| today.year()),
        query.month.unwrap_or_else(|| today.month()),
    )?;

    Ok(Json(CalendarResponse {
        grid,
        time_slots: &TIME_SLOTS,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    #[serde(default)]
    pub selected_modules: Vec<String>,
    pub vehicle_size: Option<String>,
}

/// POST /api/booking/quote
pub async fn create_quote(ApiJson(request): ApiJson<QuoteRequest>) -> Result<Json<Quote>, ApiError> {
    let selection = ModuleSelection::from_slugs(&request.selected_modules)
        .map_err(|e| ApiError::validation_field("selectedModules", e))?;
    let vehicle_size = match request.vehicle_size.as_deref() {
        Some(size) => size
            .parse::<VehicleSize>()
            .map_err(|e| ApiError::validation_field("vehicleSize", e))?,
        None => VehicleSize::default(),
    };

    Ok(Json(booking::quote(&selection, vehicle_size)))
}

// -------------------------------------------------------------------------
// Authenticated bookings
// -------------------------------------------------------------------------

/// GET /api/v1/bookings
pub async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<BookingListQuery>,
) -> Result<Json<Paginated<Booking>>, ApiError> {
    let scope = if auth.is_staff() { None } else { Some(auth.id) };
    let filter = BookingFilter::from_query(&query, scope)?;
    let pagination = Pagination::new(query.page, query.limit);
    Ok(Json(fetch_bookings(&state, filter, pagination).await?))
}

/// POST /api/v1/bookings
pub async fn create_my_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = validate_booking(&request, Some(auth.id))?;

    if let Some(vehicle_id) = booking.vehicle_id {
        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM vehicles WHERE id = $1 AND user_id = $2)",
        )
        .bind(vehicle_id)
        .bind(auth.id)
        .fetch_one(&state.db)
        .await?;

        if !owned {
            return Err(ApiError::validation_field("vehicleId", "Vehicle not found"));
        }
    }

    let created = insert_booking(&state, booking).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = find_booking(&state, id).await?;
    ensure_visible(&auth, &booking)?;
    Ok(Json(booking))
}

/// PATCH /api/v1/bookings/:id/status
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateBookingStatusRequest>,
) -> Result<Json<Booking>, ApiError> {
    auth.require_staff()?;

    let mut tx = state.db.begin().await?;

    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let current = BookingStatus::from(current.ok_or_else(|| ApiError::not_found("Booking not found"))?);

    if !current.can_transition_to(request.status) {
        return Err(ApiError::conflict(format!(
            "Cannot change booking status from {} to {}",
            current, request.status
        )));
    }

    let updated: Booking =
        sqlx::query_as("UPDATE bookings SET status = $1 WHERE id = $2 RETURNING *")
            .bind(request.status.as_str())
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;

    tracing::info!(
        booking_id = %id,
        from = %current,
        to = %request.status,
        by = %auth.id,
        "Booking status changed"
    );

    Ok(Json(updated))
}

/// POST /api/v1/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = find_booking(&state, id).await?;
    if booking.user_id != Some(auth.id) {
        return Err(ApiError::not_found("Booking not found"));
    }
    if !booking.status().is_cancellable() {
        return Err(ApiError::conflict(format!(
            "A {} booking can no longer be cancelled",
            booking.status()
        )));
    }

    // The status guard keeps a concurrent staff update from being overwritten
    let cancelled: Option<Booking> = sqlx::query_as(
        "UPDATE bookings SET status = 'cancelled' \
         WHERE id = $1 AND status IN ('pending', 'confirmed') RETURNING *",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    let cancelled =
        cancelled.ok_or_else(|| ApiError::conflict("Booking status changed, please reload"))?;
    tracing::info!(booking_id = %id, "Booking cancelled by customer");
    Ok(Json(cancelled))
}
