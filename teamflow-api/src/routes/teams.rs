/// Team endpoints
///
/// Teams and their membership lists. Every check here follows the same
/// order: load the team snapshot (404 if the team doesn't exist), evaluate
/// authorization against it (403), validate the target (404/400), then
/// mutate. Auditing and realtime emission happen after the mutation
/// succeeds and never fail the request.
///
/// The owner is immutable: they cannot be removed, demoted, or leave. The
/// only way out of ownership is deleting the team.
///
/// # Endpoints
///
/// - `POST /v1/teams` - Create team (creator becomes owner)
/// - `GET /v1/teams` - List the caller's teams
/// - `GET /v1/teams/:id` - Team detail with member list (member)
/// - `PUT /v1/teams/:id` - Update name/description (admin or owner)
/// - `DELETE /v1/teams/:id` - Delete team (owner)
/// - `POST /v1/teams/:id/members` - Invite a user by email (admin or owner)
/// - `DELETE /v1/teams/:id/members/:user_id` - Remove a member (admin or owner)
/// - `PUT /v1/teams/:id/members/:user_id/role` - Change a role (owner)
/// - `POST /v1/teams/:id/leave` - Leave the team (member, not owner)

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
        authorization::{
            require_admin_or_owner, require_member, require_not_owner, require_owner, role_of,
        },
        middleware::AuthContext,
    },
    models::{
        activity::{Activity, ActivityAction, ActivityEntity, RecordActivity},
        team::{CreateTeam, Team, TeamRole, TeamSnapshot, UpdateTeam},
        user::{User, UserRef},
    },
};
use uuid::Uuid;
use validator::Validate;

/// Create team request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeamRequest {
    /// Team name
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Optional description
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

/// Update team request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTeamRequest {
    /// New name, if changing
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    /// New description, if changing
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

/// Invite request
#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    /// Email of the user to invite; must already be registered
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Role to grant (defaults to member; owner cannot be granted)
    pub role: Option<TeamRole>,
}

/// Role change request
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    /// New role (owner cannot be granted)
    pub role: TeamRole,
}

/// One member in a team response
#[derive(Debug, Serialize)]
pub struct TeamMemberResponse {
    /// The member's user reference
    pub user: UserRef,

    /// Role within the team
    pub role: TeamRole,

    /// When the user joined
    pub joined_at: DateTime<Utc>,
}

/// Team detail response with denormalized member list
#[derive(Debug, Serialize)]
pub struct TeamResponse {
    /// Team ID
    pub id: Uuid,

    /// Team name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// The owning user
    pub owner: UserRef,

    /// All members with resolved user references
    pub members: Vec<TeamMemberResponse>,

    /// When the team was created
    pub created_at: DateTime<Utc>,

    /// When the team was last updated
    pub updated_at: DateTime<Utc>,
}

/// Generic deletion acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Status message
    pub message: String,
}

/// Resolves a snapshot into the denormalized team response
async fn build_team_response(
    db: &sqlx::PgPool,
    snapshot: &TeamSnapshot,
) -> Result<TeamResponse, ApiError> {
    let ids: Vec<Uuid> = snapshot.members.iter().map(|m| m.user_id).collect();
    let refs = User::find_refs(db, &ids).await?;

    // The owner normally appears in the member list; fall back to a direct
    // lookup if their entry is missing.
    let owner = match refs.iter().find(|r| r.id == snapshot.team.owner_id) {
        Some(r) => r.clone(),
        None => User::find_ref(db, snapshot.team.owner_id)
            .await?
            .ok_or_else(|| ApiError::InternalError("Team owner record missing".to_string()))?,
    };

    // Members whose user row has disappeared are silently skipped.
    let members = snapshot
        .members
        .iter()
        .filter_map(|m| {
            refs.iter().find(|r| r.id == m.user_id).map(|r| TeamMemberResponse {
                user: r.clone(),
                role: m.role,
                joined_at: m.joined_at,
            })
        })
        .collect();

    Ok(TeamResponse {
        id: snapshot.team.id,
        name: snapshot.team.name.clone(),
        description: snapshot.team.description.clone(),
        owner,
        members,
        created_at: snapshot.team.created_at,
        updated_at: snapshot.team.updated_at,
    })
}

/// Loads a team snapshot or fails with 404
async fn load_snapshot_or_404(
    db: &sqlx::PgPool,
    team_id: Uuid,
) -> Result<TeamSnapshot, ApiError> {
    Team::load_snapshot(db, team_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))
}

/// Create a new team
///
/// The creator becomes the owner and sole member.
pub async fn create_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<Json<TeamResponse>> {
    validate_request(&req)?;

    let team = Team::create(
        &state.db,
        CreateTeam {
            name: req.name,
            description: req.description,
            owner_id: auth.user_id,
        },
    )
    .await?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id: team.id,
            action: ActivityAction::Created,
            entity: ActivityEntity::Team,
            entity_id: team.id,
            metadata: json!({ "name": team.name }),
        },
    );

    let snapshot = load_snapshot_or_404(&state.db, team.id).await?;
    Ok(Json(build_team_response(&state.db, &snapshot).await?))
}

/// List the caller's teams, most recently created first
pub async fn list_teams(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Team>>> {
    let teams = Team::list_for_user(&state.db, auth.user_id).await?;
    Ok(Json(teams))
}

/// Get a team with its member list
pub async fn get_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<TeamResponse>> {
    let snapshot = load_snapshot_or_404(&state.db, team_id).await?;
    require_member(&snapshot, auth.user_id)?;

    Ok(Json(build_team_response(&state.db, &snapshot).await?))
}

/// Update a team's name and/or description
pub async fn update_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<UpdateTeamRequest>,
) -> ApiResult<Json<TeamResponse>> {
    validate_request(&req)?;

    let snapshot = load_snapshot_or_404(&state.db, team_id).await?;
    require_admin_or_owner(&snapshot, auth.user_id)?;

    // Field diff against the pre-update values; unchanged fields are omitted.
    let mut changes = serde_json::Map::new();
    if let Some(name) = &req.name {
        if *name != snapshot.team.name {
            changes.insert(
                "name".to_string(),
                json!({ "old": snapshot.team.name, "new": name }),
            );
        }
    }
    if let Some(description) = &req.description {
        if Some(description) != snapshot.team.description.as_ref() {
            changes.insert(
                "description".to_string(),
                json!({ "old": snapshot.team.description, "new": description }),
            );
        }
    }
    let changes = serde_json::Value::Object(changes);

    let team = Team::update(
        &state.db,
        team_id,
        UpdateTeam {
            name: req.name,
            description: req.description,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id,
            action: ActivityAction::Updated,
            entity: ActivityEntity::Team,
            entity_id: team_id,
            metadata: changes.clone(),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let snapshot = load_snapshot_or_404(&state.db, team_id).await?;
    let response = build_team_response(&state.db, &snapshot).await?;

    let event = events::team_updated(
        serde_json::to_value(&team)
            .map_err(|e| ApiError::InternalError(e.to_string()))?,
        team_id,
        changes,
        &actor,
    );
    events::emit_to_team(&state.hub, team_id, &event);

    Ok(Json(response))
}

/// Delete a team (owner only)
///
/// Member entries and the team's audit trail go with it. Projects and tasks
/// under the team are not cascaded.
pub async fn delete_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let snapshot = load_snapshot_or_404(&state.db, team_id).await?;
    require_owner(&snapshot, auth.user_id)?;

    let actor = actor_ref(&state.db, auth.user_id).await?;

    Team::delete(&state.db, team_id).await?;
    Activity::delete_by_team(&state.db, team_id).await?;

    // The room outlives the row long enough to tell everyone it's gone.
    let event = events::team_deleted(team_id, &actor);
    events::emit_to_team(&state.hub, team_id, &event);

    Ok(Json(MessageResponse {
        message: "Team deleted".to_string(),
    }))
}

/// Invite a registered user to the team by email
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<Json<TeamMemberResponse>> {
    validate_request(&req)?;

    let role = req.role.unwrap_or(TeamRole::Member);
    if role == TeamRole::Owner {
        return Err(ApiError::BadRequest(
            "The owner role cannot be granted".to_string(),
        ));
    }

    let snapshot = load_snapshot_or_404(&state.db, team_id).await?;
    require_admin_or_owner(&snapshot, auth.user_id)?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user with this email".to_string()))?;

    // Duplicate membership hits the composite primary key and surfaces as 409.
    let member = Team::add_member(&state.db, team_id, user.id, role).await?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id,
            action: ActivityAction::MemberAdded,
            entity: ActivityEntity::User,
            entity_id: user.id,
            metadata: json!({ "email": user.email, "role": role }),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let user_ref = user.to_ref();

    let event = events::member_added(team_id, &user_ref, role, &actor);
    events::emit_to_team(&state.hub, team_id, &event);
    events::emit_to_user(&state.hub, user_ref.id, &event);

    Ok(Json(TeamMemberResponse {
        user: user_ref,
        role: member.role,
        joined_at: member.joined_at,
    }))
}

/// Remove a member from the team
///
/// The owner cannot be removed. The removed user gets a personal copy of
/// the event, so a client can drop team state even after leaving the room.
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<MessageResponse>> {
    let snapshot = load_snapshot_or_404(&state.db, team_id).await?;
    require_admin_or_owner(&snapshot, auth.user_id)?;
    require_not_owner(&snapshot, user_id)?;

    if !snapshot.members.iter().any(|m| m.user_id == user_id) {
        return Err(ApiError::NotFound("Member not found".to_string()));
    }

    Team::remove_member(&state.db, team_id, user_id).await?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id,
            action: ActivityAction::MemberRemoved,
            entity: ActivityEntity::User,
            entity_id: user_id,
            metadata: json!({}),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let removed = User::find_ref(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    let event = events::member_removed(team_id, &removed, &actor);
    events::emit_to_team(&state.hub, team_id, &event);
    events::emit_to_user(&state.hub, user_id, &event);

    Ok(Json(MessageResponse {
        message: "Member removed".to_string(),
    }))
}

/// Change a member's role (owner only)
///
/// The owner's own role is immutable, and the owner role cannot be granted.
pub async fn update_member_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<TeamMemberResponse>> {
    if req.role == TeamRole::Owner {
        return Err(ApiError::BadRequest(
            "The owner role cannot be granted".to_string(),
        ));
    }

    let snapshot = load_snapshot_or_404(&state.db, team_id).await?;
    require_owner(&snapshot, auth.user_id)?;
    require_not_owner(&snapshot, user_id)?;

    let old_role = role_of(&snapshot, user_id)
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    let member = Team::update_member_role(&state.db, team_id, user_id, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id,
            action: ActivityAction::RoleChanged,
            entity: ActivityEntity::User,
            entity_id: user_id,
            metadata: json!({ "old_role": old_role, "new_role": member.role }),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let user_ref = User::find_ref(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    let event = events::member_role_updated(team_id, &user_ref, member.role, &actor);
    events::emit_to_team(&state.hub, team_id, &event);
    events::emit_to_user(&state.hub, user_id, &event);

    Ok(Json(TeamMemberResponse {
        user: user_ref,
        role: member.role,
        joined_at: member.joined_at,
    }))
}

/// Leave the team
///
/// Any member except the owner may leave at any time.
pub async fn leave_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let snapshot = load_snapshot_or_404(&state.db, team_id).await?;
    require_member(&snapshot, auth.user_id)?;
    require_not_owner(&snapshot, auth.user_id)?;

    Team::remove_member(&state.db, team_id, auth.user_id).await?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id,
            action: ActivityAction::MemberRemoved,
            entity: ActivityEntity::User,
            entity_id: auth.user_id,
            metadata: json!({ "left": true }),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let event = events::member_left(team_id, &actor);
    events::emit_to_team(&state.hub, team_id, &event);

    Ok(Json(MessageResponse {
        message: "Left the team".to_string(),
    }))
}
