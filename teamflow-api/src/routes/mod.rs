/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Authentication endpoints (register, verify-otp, login, refresh, me)
/// - `teams`: Team CRUD and membership management
/// - `projects`: Project CRUD
/// - `tasks`: Task CRUD, status transitions, and assignment
/// - `activities`: Audit log queries

pub mod activities;
pub mod auth;
pub mod health;
pub mod projects;
pub mod tasks;
pub mod teams;

use crate::error::{ApiError, ValidationErrorDetail};
use sqlx::PgPool;
use teamflow_shared::models::activity::{Activity, RecordActivity};
use teamflow_shared::models::user::{User, UserRef};
use uuid::Uuid;
use validator::Validate;

/// Runs derive-based validation and maps failures to a 422 response
pub(crate) fn validate_request<T: Validate>(req: &T) -> Result<(), ApiError> {
    req.validate().map_err(|e| {
        let errors: Vec<ValidationErrorDetail> = e
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(errors)
    })
}

/// Records an audit entry in the background
///
/// Auditing never fails or delays the mutation it documents: the insert runs
/// on its own task and a failure is only logged.
pub(crate) fn record_activity(db: &PgPool, data: RecordActivity) {
    let db = db.clone();
    tokio::spawn(async move {
        if let Err(err) = Activity::record(&db, data).await {
            tracing::error!("Failed to record activity: {}", err);
        }
    });
}

/// Loads the acting user's denormalized reference for responses and events
pub(crate) async fn actor_ref(db: &PgPool, user_id: Uuid) -> Result<UserRef, ApiError> {
    User::find_ref(db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))
}
