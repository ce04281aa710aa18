/// Activity audit log endpoints
///
/// Read-only views over the append-only audit trail. Records are written by
/// the mutating handlers; nothing here mutates.
///
/// # Endpoints
///
/// - `GET /v1/teams/:id/activities` - Team feed, filtered and paginated (member)
/// - `GET /v1/teams/:id/activities/stats` - Counts by (entity, action) (member)
/// - `GET /v1/tasks/:id/activities` - One task's audit trail (member)
/// - `GET /v1/activities/me` - The caller's own actions across teams

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teamflow_shared::{
    auth::{authorization::require_member, middleware::AuthContext},
    models::{
        activity::{Activity, ActivityAction, ActivityEntity, ActivityFilter, ActivityStat},
        team::Team,
    },
};
use uuid::Uuid;

/// Default page size for activity feeds
const DEFAULT_LIMIT: i64 = 50;

/// Hard cap on page size
const MAX_LIMIT: i64 = 100;

/// Team feed query parameters
#[derive(Debug, Deserialize, Default)]
pub struct TeamActivityQuery {
    /// Only records about this entity kind
    pub entity: Option<ActivityEntity>,

    /// Only records with this action
    pub action: Option<ActivityAction>,

    /// Only records by this actor
    pub actor: Option<Uuid>,

    /// Only records at or after this time (RFC 3339)
    pub from: Option<DateTime<Utc>>,

    /// Only records at or before this time (RFC 3339)
    pub to: Option<DateTime<Utc>>,

    /// Page size (default 50, max 100)
    pub limit: Option<i64>,

    /// Page offset
    pub offset: Option<i64>,
}

/// Stats query parameters
#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    /// Trailing window in days (default 30, max 365)
    pub days: Option<i64>,
}

/// Limit query for the simpler feeds
#[derive(Debug, Deserialize, Default)]
pub struct LimitQuery {
    /// Page size (default 50, max 100)
    pub limit: Option<i64>,
}

/// Paginated activity feed
#[derive(Debug, Serialize)]
pub struct ActivityPage {
    /// Records, newest first
    pub activities: Vec<Activity>,

    /// Total records matching the filters
    pub total: i64,

    /// Page size used
    pub limit: i64,

    /// Page offset used
    pub offset: i64,
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct ActivityStatsResponse {
    /// Counts by (entity, action), largest first
    pub stats: Vec<ActivityStat>,

    /// Window the counts cover, in days
    pub days: i64,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Team activity feed, newest first
pub async fn list_team_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Query(query): Query<TeamActivityQuery>,
) -> ApiResult<Json<ActivityPage>> {
    let snapshot = Team::load_snapshot(&state.db, team_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))?;
    require_member(&snapshot, auth.user_id)?;

    let filter = ActivityFilter {
        entity: query.entity,
        action: query.action,
        actor: query.actor,
        from: query.from,
        to: query.to,
    };
    let limit = clamp_limit(query.limit);
    let offset = query.offset.unwrap_or(0).max(0);

    let activities = Activity::list_by_team(&state.db, team_id, &filter, limit, offset).await?;
    let total = Activity::count_by_team(&state.db, team_id, &filter).await?;

    Ok(Json(ActivityPage {
        activities,
        total,
        limit,
        offset,
    }))
}

/// Team activity counts by (entity, action) over a trailing window
pub async fn team_activity_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<ActivityStatsResponse>> {
    let snapshot = Team::load_snapshot(&state.db, team_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))?;
    require_member(&snapshot, auth.user_id)?;

    let days = query.days.unwrap_or(30).clamp(1, 365);
    let stats = Activity::stats(&state.db, team_id, days).await?;

    Ok(Json(ActivityStatsResponse { stats, days }))
}

/// One task's audit trail, newest first
pub async fn list_task_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Activity>>> {
    let (_, _, snapshot) = super::tasks::load_task_context(&state.db, task_id).await?;
    require_member(&snapshot, auth.user_id)?;

    let activities = Activity::list_by_entity(
        &state.db,
        ActivityEntity::Task,
        task_id,
        clamp_limit(query.limit),
    )
    .await?;

    Ok(Json(activities))
}

/// The caller's own actions across all their teams, newest first
pub async fn my_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Activity>>> {
    let activities =
        Activity::list_by_actor(&state.db, auth.user_id, clamp_limit(query.limit)).await?;

    Ok(Json(activities))
}
