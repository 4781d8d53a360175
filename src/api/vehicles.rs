use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiPath};
use super::validation::{sanitize_optional, validate_required_text, validate_vehicle_year};
use crate::booking::VehicleSize;
use crate::db::{CreateVehicleRequest, Vehicle};
use crate::AppState;

const MAX_VEHICLE_TEXT: usize = 80;

/// List the caller's vehicles
pub async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let vehicles: Vec<Vehicle> =
        sqlx::query_as("SELECT * FROM vehicles WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(auth.id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(vehicles))
}

/// Register a vehicle for the caller
pub async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<CreateVehicleRequest>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let make = errors.check(
        "make",
        validate_required_text(&request.make, "Make", MAX_VEHICLE_TEXT),
    );
    let model = errors.check(
        "model",
        validate_required_text(&request.model, "Model", MAX_VEHICLE_TEXT),
    );
    let year = errors.check("year", validate_vehicle_year(request.year));
    let size = match request.size.as_deref() {
        Some(size) => errors.check("size", size.parse::<VehicleSize>()),
        None => Some(VehicleSize::default()),
    };
    let color = sanitize_optional(&request.color);

    let (Some(make), Some(model), Some(year), Some(size)) = (make, model, year, size) else {
        return Err(errors
            .build()
            .unwrap_or_else(|| ApiError::bad_request("Invalid vehicle")));
    };

    let vehicle: Vehicle = sqlx::query_as(
        "INSERT INTO vehicles (user_id, make, model, year, size, color) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(auth.id)
    .bind(&make)
    .bind(&model)
    .bind(year)
    .bind(size.as_str())
    .bind(&color)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(vehicle_id = %vehicle.id, user_id = %auth.id, "Vehicle added");
    Ok((StatusCode::CREATED, Json(vehicle)))
}

/// Delete one of the caller's vehicles. Bookings keep their data.
pub async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM vehicles WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Vehicle not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
