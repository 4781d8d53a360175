use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use super::validation::{sanitize_optional, validate_email, validate_phone, MAX_TEXT_LENGTH};
use crate::auth::{
    generate_token, hash_password, hash_token, validate_password_strength, verify_password,
    verify_password_timing_dummy, AuthError,
};
use crate::db::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, Session,
    User, UserResponse, UserRole,
};
use crate::AppState;

/// The caller identified by a valid bearer access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AuthError::Forbidden.into())
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(AuthError::Forbidden.into())
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or(AuthError::InvalidToken)?;
        let claims = state.tokens.verify_access_token(token)?;
        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// A freshly minted token pair plus the row that backs its refresh token
struct NewSession {
    response: AuthResponse,
    token_hash: String,
    expires_at: DateTime<Utc>,
}

fn prepare_session(state: &AppState, user: User) -> Result<NewSession, ApiError> {
    let refresh_token = generate_token();
    let token_hash = hash_token(&refresh_token);
    let expires_at = Utc::now() + state.tokens.refresh_ttl();

    let access_token = state
        .tokens
        .issue_access_token(user.id, &user.email, user.role())?;

    Ok(NewSession {
        response: AuthResponse {
            user: UserResponse::from(user),
            access_token,
            refresh_token,
            expires_in: state.tokens.access_ttl().num_seconds(),
        },
        token_hash,
        expires_at,
    })
}

/// Create a session row for `user` on `conn` and sign a fresh access token.
/// Callers holding a transaction pass it here so the insert commits with it.
async fn issue_session(
    state: &AppState,
    conn: &mut PgConnection,
    user: User,
) -> Result<AuthResponse, ApiError> {
    let session = prepare_session(state, user)?;

    sqlx::query("INSERT INTO sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(session.response.user.id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .execute(&mut *conn)
        .await?;

    Ok(session.response)
}

/// Register a customer account
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let email = errors.check("email", validate_email(&request.email));
    if let Err(err) = validate_password_strength(&request.password) {
        errors.add("password", err.to_string());
    }
    let name = sanitize_optional(&Some(request.name.clone())).unwrap_or_default();
    if name.chars().count() > MAX_TEXT_LENGTH {
        errors.add("name", "Name is too long");
    }
    let phone = match sanitize_optional(&request.phone) {
        Some(phone) => errors.check("phone", validate_phone(&phone)),
        None => None,
    };
    errors.finish()?;
    let email = email.ok_or_else(|| ApiError::validation_field("email", "Email is required"))?;

    let password_hash = hash_password(&request.password)?;

    let user: User = sqlx::query_as(
        "INSERT INTO users (email, password_hash, name, phone, role) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(&name)
    .bind(&phone)
    .bind(UserRole::Customer.as_str())
    .fetch_one(&state.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::from(AuthError::UserExists)
        }
        _ => ApiError::from(e),
    })?;

    tracing::info!(user_id = %user.id, "Registered new user");

    let mut conn = state.db.acquire().await?;
    let response = issue_session(&state, &mut conn, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    let Some(user) = user else {
        // Unknown emails cost one Argon2 verify, like known ones
        verify_password_timing_dummy(&request.password);
        return Err(AuthError::InvalidCredentials.into());
    };

    if !verify_password(&request.password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "Failed login attempt");
        return Err(AuthError::InvalidCredentials.into());
    }
    if !user.is_active {
        return Err(AuthError::AccountDisabled.into());
    }

    let mut conn = state.db.acquire().await?;
    Ok(Json(issue_session(&state, &mut conn, user).await?))
}

/// Exchange a refresh token for a new token pair. The old session is consumed.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let token_hash = hash_token(request.refresh_token.trim());

    let mut tx = state.db.begin().await?;

    let session: Option<Session> =
        sqlx::query_as("DELETE FROM sessions WHERE token_hash = $1 RETURNING *")
            .bind(&token_hash)
            .fetch_optional(&mut *tx)
            .await?;
    let session = session.ok_or(AuthError::InvalidToken)?;

    if session.expires_at <= Utc::now() {
        // Keep the deletion of the stale session
        tx.commit().await?;
        return Err(AuthError::TokenExpired.into());
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(session.user_id)
        .fetch_optional(&mut *tx)
        .await?;
    let user = user.ok_or(AuthError::InvalidToken)?;
    if !user.is_active {
        tx.commit().await?;
        return Err(AuthError::AccountDisabled.into());
    }

    // The replacement session commits together with the deletion of the old one
    let response = issue_session(&state, &mut tx, user).await?;
    tx.commit().await?;

    Ok(Json(response))
}

/// Revoke a refresh token. Unknown tokens are ignored.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<StatusCode, ApiError> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
        .bind(hash_token(request.refresh_token.trim()))
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Get the current user
pub async fn me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or(AuthError::InvalidToken)?;
    Ok(Json(UserResponse::from(user)))
}

/// Change the caller's password and sign out every session
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate_password_strength(&request.new_password)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or(AuthError::InvalidToken)?;

    if !verify_password(&request.current_password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials.into());
    }

    let password_hash = hash_password(&request.new_password)?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&password_hash)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    tracing::info!(user_id = %user.id, revoked, "Password changed, sessions revoked");
    Ok(StatusCode::NO_CONTENT)
}
