/// Project endpoints
///
/// A project belongs to one team for its lifetime. Access is always decided
/// against the owning team's snapshot: any member may view and create,
/// admins and the owner may update and delete.
///
/// # Endpoints
///
/// - `POST /v1/projects` - Create project (team member)
/// - `GET /v1/teams/:id/projects` - List a team's projects (member)
/// - `GET /v1/projects/:id` - Project detail (member)
/// - `PUT /v1/projects/:id` - Update (admin or owner)
/// - `DELETE /v1/projects/:id` - Delete (admin or owner)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    realtime::events,
    routes::{actor_ref, record_activity, validate_request},
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use teamflow_shared::{
    auth::{
        authorization::{require_admin_or_owner, require_member},
        middleware::AuthContext,
    },
    models::{
        activity::{ActivityAction, ActivityEntity, RecordActivity},
        project::{CreateProject, Project, UpdateProject},
        team::{Team, TeamSnapshot},
        user::{User, UserRef},
    },
};
use uuid::Uuid;
use validator::Validate;

use super::teams::MessageResponse;

/// Create project request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    /// Project name
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Optional description
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    /// Owning team
    pub team_id: Uuid,
}

/// Update project request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    /// New name, if changing
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    /// New description, if changing
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

/// Project response with resolved creator
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    /// Project ID
    pub id: Uuid,

    /// Project name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Owning team
    pub team_id: Uuid,

    /// User who created the project
    pub created_by: UserRef,

    /// When the project was created
    pub created_at: DateTime<Utc>,

    /// When the project was last updated
    pub updated_at: DateTime<Utc>,
}

async fn build_project_response(
    db: &sqlx::PgPool,
    project: &Project,
) -> Result<ProjectResponse, ApiError> {
    let created_by = User::find_ref(db, project.created_by)
        .await?
        .ok_or_else(|| ApiError::InternalError("Project creator record missing".to_string()))?;

    Ok(ProjectResponse {
        id: project.id,
        name: project.name.clone(),
        description: project.description.clone(),
        team_id: project.team_id,
        created_by,
        created_at: project.created_at,
        updated_at: project.updated_at,
    })
}

/// Loads a project and its team snapshot, or fails with 404
///
/// A project whose team has been deleted is unreachable: with no member
/// list to authorize against, it reads as not found.
pub(crate) async fn load_project_context(
    db: &sqlx::PgPool,
    project_id: Uuid,
) -> Result<(Project, TeamSnapshot), ApiError> {
    let project = Project::find(db, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    let snapshot = Team::load_snapshot(db, project.team_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    Ok((project, snapshot))
}

/// Create a new project
pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<Json<ProjectResponse>> {
    validate_request(&req)?;

    let snapshot = Team::load_snapshot(&state.db, req.team_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))?;
    require_member(&snapshot, auth.user_id)?;

    let project = Project::create(
        &state.db,
        CreateProject {
            name: req.name,
            description: req.description,
            team_id: req.team_id,
            created_by: auth.user_id,
        },
    )
    .await?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id: project.team_id,
            action: ActivityAction::Created,
            entity: ActivityEntity::Project,
            entity_id: project.id,
            metadata: json!({ "name": project.name }),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let response = build_project_response(&state.db, &project).await?;

    let event = events::project_created(
        serde_json::to_value(&project).map_err(|e| ApiError::InternalError(e.to_string()))?,
        project.team_id,
        &actor,
    );
    events::emit_to_team(&state.hub, project.team_id, &event);

    Ok(Json(response))
}

/// List a team's projects, most recently created first
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Project>>> {
    let snapshot = Team::load_snapshot(&state.db, team_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))?;
    require_member(&snapshot, auth.user_id)?;

    let projects = Project::list_by_team(&state.db, team_id).await?;
    Ok(Json(projects))
}

/// Get a project
pub async fn get_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectResponse>> {
    let (project, snapshot) = load_project_context(&state.db, project_id).await?;
    require_member(&snapshot, auth.user_id)?;

    Ok(Json(build_project_response(&state.db, &project).await?))
}

/// Update a project's name and/or description
pub async fn update_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<ProjectResponse>> {
    validate_request(&req)?;

    let (project, snapshot) = load_project_context(&state.db, project_id).await?;
    require_admin_or_owner(&snapshot, auth.user_id)?;

    let mut changes = serde_json::Map::new();
    if let Some(name) = &req.name {
        if *name != project.name {
            changes.insert(
                "name".to_string(),
                json!({ "old": project.name, "new": name }),
            );
        }
    }
    if let Some(description) = &req.description {
        if Some(description) != project.description.as_ref() {
            changes.insert(
                "description".to_string(),
                json!({ "old": project.description, "new": description }),
            );
        }
    }
    let changes = serde_json::Value::Object(changes);

    let project = Project::update(
        &state.db,
        project_id,
        UpdateProject {
            name: req.name,
            description: req.description,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id: project.team_id,
            action: ActivityAction::Updated,
            entity: ActivityEntity::Project,
            entity_id: project.id,
            metadata: changes.clone(),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let response = build_project_response(&state.db, &project).await?;

    let event = events::project_updated(
        serde_json::to_value(&project).map_err(|e| ApiError::InternalError(e.to_string()))?,
        project.team_id,
        changes,
        &actor,
    );
    events::emit_to_team(&state.hub, project.team_id, &event);

    Ok(Json(response))
}

/// Delete a project
///
/// Tasks under the project are not cascaded.
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let (project, snapshot) = load_project_context(&state.db, project_id).await?;
    require_admin_or_owner(&snapshot, auth.user_id)?;

    Project::delete(&state.db, project_id).await?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id: project.team_id,
            action: ActivityAction::Deleted,
            entity: ActivityEntity::Project,
            entity_id: project.id,
            metadata: json!({ "name": project.name }),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let event = events::project_deleted(project.id, project.team_id, &actor);
    events::emit_to_team(&state.hub, project.team_id, &event);

    Ok(Json(MessageResponse {
        message: "Project deleted".to_string(),
    }))
}
