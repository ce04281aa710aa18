/// Authentication endpoints
///
/// Registration is two-step: `register` stores an unverified user with a
/// hashed one-time code and emails the code; `verify-otp` proves control of
/// the address, at which point the server generates the user's first
/// password, returns it once, and issues tokens. Verification happens
/// exactly once per account; a repeat registration attempt against a
/// still-unverified email re-issues a fresh code, against a verified email
/// it fails with Conflict.
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Start registration, email a one-time code
/// - `POST /v1/auth/verify-otp` - Verify the code, receive password + tokens
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Refresh access token
/// - `GET /v1/auth/me` - Current user profile (authenticated)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::validate_request,
};
use axum::{extract::State, Extension, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use teamflow_shared::{
    auth::{jwt, middleware::AuthContext, otp, password},
    models::user::User,
};
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Display name
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Register response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// Status message
    pub message: String,

    /// Email the code was sent to
    pub email: String,
}

/// OTP verification request
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Six-digit one-time code
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub otp: String,
}

/// OTP verification response
#[derive(Debug, Serialize)]
pub struct VerifyOtpResponse {
    /// The verified user
    pub user: User,

    /// Generated first password, returned exactly once
    pub password: String,

    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// The authenticated user
    pub user: User,

    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub access_token: String,
}

/// Start registration
///
/// Creates (or re-issues, if the email exists unverified) an unverified user
/// with a hashed one-time code, and emails the code. A verified email fails
/// with Conflict.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// Content-Type: application/json
///
/// { "name": "Ada Lovelace", "email": "ada@example.com" }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: Email already registered and verified
/// - `422 Unprocessable Entity`: Validation failed
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    validate_request(&req)?;

    let code = otp::generate_otp();
    let otp_hash = otp::hash_otp(&code);
    let otp_expiry = Utc::now() + Duration::minutes(state.config.otp_ttl_minutes);

    let user = User::upsert_unverified(&state.db, &req.name, &req.email, &otp_hash, otp_expiry)
        .await?
        .ok_or_else(|| ApiError::Conflict("Email already registered".to_string()))?;

    // The code is already stored, so a mail failure only loses this delivery;
    // the user can register again for a fresh code.
    let body = format!(
        "Your verification code is {}. It expires in {} minutes.",
        code, state.config.otp_ttl_minutes
    );
    if let Err(err) = state
        .mailer
        .send(&user.email, "Your TeamFlow verification code", &body)
        .await
    {
        tracing::error!(email = %user.email, "Failed to send verification code: {}", err);
    }

    Ok(Json(RegisterResponse {
        message: "Verification code sent".to_string(),
        email: user.email,
    }))
}

/// Complete registration
///
/// Verifies the one-time code, marks the user verified (exactly once),
/// generates and stores their first password, and issues tokens. The
/// password is returned in this response and emailed; it is never
/// retrievable again.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/verify-otp
/// Content-Type: application/json
///
/// { "email": "ada@example.com", "otp": "123456" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Wrong or expired code, or no pending registration
/// - `409 Conflict`: Email already verified
/// - `422 Unprocessable Entity`: Validation failed
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<Json<VerifyOtpResponse>> {
    validate_request(&req)?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired code".to_string()))?;

    if user.is_verified {
        return Err(ApiError::Conflict("Email already verified".to_string()));
    }

    let valid = match (&user.otp_hash, user.otp_expiry) {
        (Some(hash), Some(expiry)) => otp::verify_otp(&req.otp, hash, expiry),
        _ => false,
    };
    if !valid {
        return Err(ApiError::BadRequest("Invalid or expired code".to_string()));
    }

    let first_password = password::generate_password();
    let password_hash = password::hash_password(&first_password)?;

    // The is_verified guard in the UPDATE makes this succeed at most once,
    // even under concurrent verification attempts.
    let user = User::mark_verified(&state.db, user.id, &password_hash)
        .await?
        .ok_or_else(|| ApiError::Conflict("Email already verified".to_string()))?;

    let body = format!(
        "Your account is verified. Your password is: {}",
        first_password
    );
    if let Err(err) = state
        .mailer
        .send(&user.email, "Your TeamFlow password", &body)
        .await
    {
        tracing::error!(email = %user.email, "Failed to send password email: {}", err);
    }

    let access_claims = jwt::Claims::new(user.id, jwt::TokenType::Access);
    let refresh_claims = jwt::Claims::new(user.id, jwt::TokenType::Refresh);

    let access_token = jwt::create_token(&access_claims, state.jwt_secret())?;
    let refresh_token = jwt::create_token(&refresh_claims, state.jwt_secret())?;

    Ok(Json(VerifyOtpResponse {
        user,
        password: first_password,
        access_token,
        refresh_token,
    }))
}

/// Login endpoint
///
/// Authenticates a verified user and returns JWT tokens. Unknown emails,
/// wrong passwords, and unverified accounts all produce the same 401 so
/// login cannot be used to probe which emails exist.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/login
/// Content-Type: application/json
///
/// { "email": "ada@example.com", "password": "..." }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
/// - `422 Unprocessable Entity`: Validation failed
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    validate_request(&req)?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(invalid)?;

    let Some(password_hash) = user.password_hash.as_deref() else {
        return Err(invalid());
    };
    if !user.is_verified || !password::verify_password(&req.password, password_hash)? {
        return Err(invalid());
    }

    let access_claims = jwt::Claims::new(user.id, jwt::TokenType::Access);
    let refresh_claims = jwt::Claims::new(user.id, jwt::TokenType::Refresh);

    let access_token = jwt::create_token(&access_claims, state.jwt_secret())?;
    let refresh_token = jwt::create_token(&refresh_claims, state.jwt_secret())?;

    Ok(Json(LoginResponse {
        user,
        access_token,
        refresh_token,
    }))
}

/// Token refresh endpoint
///
/// Exchanges a refresh token for a new access token.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid or expired refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}

/// Current user profile
///
/// # Endpoint
///
/// ```text
/// GET /v1/auth/me
/// Authorization: Bearer <access token>
/// ```
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    let user = User::find(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}
