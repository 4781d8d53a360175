pub mod auth;
mod bookings;
pub mod error;
pub mod extract;
pub mod pagination;
pub mod rate_limit;
pub mod security;
mod services;
pub mod validation;
mod vehicles;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::db::{migration_status, PgMigrationStore, MIGRATIONS};
use crate::AppState;
use error::ApiError;

pub use error::set_expose_internal_errors;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential endpoints get the stricter auth tier
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ))
        .route("/me", get(auth::me))
        .route("/password", post(auth::change_password));

    // Public booking contract used by the booking page
    let booking_routes = Router::new()
        .route(
            "/",
            get(bookings::list_bookings)
                .post(bookings::create_booking)
                .fallback(bookings::method_not_allowed),
        )
        .route("/calendar", get(bookings::calendar))
        .route("/quote", post(bookings::create_quote));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        // Bookings
        .route(
            "/bookings",
            get(bookings::list_my_bookings).post(bookings::create_my_booking),
        )
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/status", patch(bookings::update_booking_status))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        // Service catalog
        .route("/services/packages", get(services::list_packages))
        .route(
            "/services/modules",
            get(services::list_modules).post(services::create_module),
        )
        // Vehicles
        .route(
            "/vehicles",
            get(vehicles::list_vehicles).post(vehicles::create_vehicle),
        )
        .route("/vehicles/:id", delete(vehicles::delete_vehicle));

    let api_routes = Router::new()
        .nest("/booking", booking_routes)
        .nest("/v1", v1_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ))
        .route("/health", get(api_health));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(security::security_headers))
        .layer(cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(600));

    if config.allows_any() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
    schema_version: i64,
    latest_schema_version: i64,
}

/// Readiness: database reachable and schema state known
async fn api_health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    if let Err(e) = crate::db::ping(&state.db).await {
        tracing::warn!(error = %e, "Health check: database unreachable");
        return Err(ApiError::service_unavailable("Database is unreachable"));
    }

    let store = PgMigrationStore::new(&state.db);
    let status = migration_status(&store, MIGRATIONS).await.map_err(|e| {
        tracing::warn!(error = %e, "Health check: migration status unavailable");
        ApiError::service_unavailable("Schema version unavailable")
    })?;

    Ok(Json(HealthResponse {
        status: if status.is_up_to_date() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: "connected",
        schema_version: status.current_version,
        latest_schema_version: status.latest_version,
    }))
}

#[cfg(test)]
mod tests {
    use super::test_support::{body_json, test_state};
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_liveness() {
        let response = create_router(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_uses_error_envelope() {
        let response = create_router(test_state())
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let (status, body) = body_json(response).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_api_responses_carry_rate_limit_headers() {
        let response = create_router(test_state())
            .oneshot(
                Request::get("/api/booking/calendar?year=2026&month=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_auth_tier_exhaustion_returns_429() {
        let state = test_state();
        let limit = state.config.rate_limit.auth_requests_per_window;
        let app = create_router(state);

        let login = || {
            Request::post("/api/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from("{"))
                .unwrap()
        };

        for _ in 0..limit {
            let response = app.clone().oneshot(login()).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let response = app.oneshot(login()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }

    #[test]
    fn test_cors_origin_list() {
        let config = CorsConfig {
            origin: "http://localhost:5173, https://detail.example.com".to_string(),
        };
        assert!(!config.allows_any());
        // Builds without panicking on a list of origins
        let _ = cors_layer(&config);
        let _ = cors_layer(&CorsConfig {
            origin: "*".to_string(),
        });
    }
}
