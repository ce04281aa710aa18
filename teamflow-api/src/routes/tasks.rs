/// Task endpoints
///
/// Tasks live under a project and inherit the project's team for every
/// access decision. Any member may create, view, and update tasks; deletion
/// additionally allows the task's creator. Every status write, whether via
/// the dedicated status endpoint or folded into a general update, goes
/// through the transition table; every assignee write is checked against
/// the team's member list.
///
/// Update handlers compute the final field set and the old/new diff against
/// the loaded task, persist in one statement, and carry the diff in both
/// the audit record and the `task:updated` event.
///
/// # Endpoints
///
/// - `POST /v1/tasks` - Create task (team member)
/// - `GET /v1/tasks/project/:project_id` - List a project's tasks, filterable
/// - `GET /v1/tasks/:id` - Task detail (member)
/// - `PUT /v1/tasks/:id` - General field update (member)
/// - `PUT /v1/tasks/:id/status` - Status transition (member)
/// - `PUT /v1/tasks/:id/assign` - Assign or unassign (member)
/// - `DELETE /v1/tasks/:id` - Delete (admin, owner, or creator)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    realtime::events,
    routes::{actor_ref, record_activity, validate_request},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use teamflow_shared::{
    auth::{
        authorization::{is_admin_or_owner, is_member, require_member},
        middleware::AuthContext,
    },
    models::{
        activity::{ActivityAction, ActivityEntity, RecordActivity},
        task::{CreateTask, Task, TaskFilter, TaskPriority, TaskStatus, TaskUpdate},
        team::TeamSnapshot,
        user::{User, UserRef},
    },
};
use uuid::Uuid;
use validator::Validate;

use super::projects::load_project_context;
use super::teams::MessageResponse;

/// Create task request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    /// Task title
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    /// Optional description
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    /// Priority (defaults to medium)
    pub priority: Option<TaskPriority>,

    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,

    /// Optional assignee; must be a member of the project's team
    pub assignee_id: Option<Uuid>,

    /// Owning project
    pub project_id: Uuid,
}

/// General task update request
///
/// `assignee_id` distinguishes "absent" (leave unchanged) from explicit
/// `null` (unassign) via the nested Option.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    /// New title, if changing
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    /// New description, if changing
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    /// New priority, if changing
    pub priority: Option<TaskPriority>,

    /// New status, if changing (gated by the transition table)
    pub status: Option<TaskStatus>,

    /// New due date, if changing
    pub due_date: Option<DateTime<Utc>>,

    /// Absent = unchanged, null = unassign, value = assign
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,
}

/// Status transition request
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// Target status
    pub status: TaskStatus,
}

/// Assignment request; `null` unassigns
#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    /// New assignee, or null to unassign
    pub assignee_id: Option<Uuid>,
}

/// Task list filters
#[derive(Debug, Deserialize, Default)]
pub struct ListTasksQuery {
    /// Only tasks with this status
    pub status: Option<TaskStatus>,

    /// Only tasks with this priority
    pub priority: Option<TaskPriority>,

    /// Only tasks assigned to this user
    pub assignee_id: Option<Uuid>,
}

/// Task response with resolved assignee and creator
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    /// Task ID
    pub id: Uuid,

    /// Task title
    pub title: String,

    /// Optional description
    pub description: Option<String>,

    /// Priority
    pub priority: TaskPriority,

    /// Current workflow status
    pub status: TaskStatus,

    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,

    /// Assigned user, resolved
    pub assignee: Option<UserRef>,

    /// Owning project
    pub project_id: Uuid,

    /// User who created the task, resolved
    pub created_by: UserRef,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

/// Keeps `Some(None)` distinct from `None` when a field is present but null
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

async fn build_task_response(db: &sqlx::PgPool, task: &Task) -> Result<TaskResponse, ApiError> {
    let assignee = match task.assignee_id {
        Some(id) => User::find_ref(db, id).await?,
        None => None,
    };

    let created_by = User::find_ref(db, task.created_by)
        .await?
        .ok_or_else(|| ApiError::InternalError("Task creator record missing".to_string()))?;

    Ok(TaskResponse {
        id: task.id,
        title: task.title.clone(),
        description: task.description.clone(),
        priority: task.priority,
        status: task.status,
        due_date: task.due_date,
        assignee,
        project_id: task.project_id,
        created_by,
        created_at: task.created_at,
        updated_at: task.updated_at,
    })
}

/// Loads a task and its team snapshot, or fails with 404
///
/// Like projects, a task whose project or team is gone is unreachable.
pub(crate) async fn load_task_context(
    db: &sqlx::PgPool,
    task_id: Uuid,
) -> Result<(Task, Uuid, TeamSnapshot), ApiError> {
    let task = Task::find(db, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    let (project, snapshot) = load_project_context(db, task.project_id)
        .await
        .map_err(|_| ApiError::NotFound("Task not found".to_string()))?;

    Ok((task, project.team_id, snapshot))
}

/// Rejects assignees who are not members of the task's team
fn check_assignee(snapshot: &TeamSnapshot, assignee_id: Uuid) -> Result<(), ApiError> {
    if is_member(snapshot, assignee_id) {
        Ok(())
    } else {
        Err(ApiError::InvalidAssignee)
    }
}

fn task_json(task: &Task) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(task).map_err(|e| ApiError::InternalError(e.to_string()))
}

/// Create a new task in todo status
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    validate_request(&req)?;

    let (project, snapshot) = load_project_context(&state.db, req.project_id).await?;
    require_member(&snapshot, auth.user_id)?;

    if let Some(assignee_id) = req.assignee_id {
        check_assignee(&snapshot, assignee_id)?;
    }

    let task = Task::create(
        &state.db,
        CreateTask {
            title: req.title,
            description: req.description,
            priority: req.priority.unwrap_or(TaskPriority::Medium),
            due_date: req.due_date,
            assignee_id: req.assignee_id,
            project_id: req.project_id,
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
            entity: ActivityEntity::Task,
            entity_id: task.id,
            metadata: json!({ "title": task.title }),
        },
    );

    // An initial assignee is its own audit record, same as assignment after
    // the fact.
    if task.assignee_id.is_some() {
        record_activity(
            &state.db,
            RecordActivity {
                user_id: auth.user_id,
                team_id: project.team_id,
                action: ActivityAction::Assigned,
                entity: ActivityEntity::Task,
                entity_id: task.id,
                metadata: json!({ "assignee_id": task.assignee_id }),
            },
        );
    }

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let response = build_task_response(&state.db, &task).await?;

    let event = events::task_created(task_json(&task)?, project.team_id, task.project_id, &actor);
    events::emit_to_team(&state.hub, project.team_id, &event);

    if let Some(assignee_id) = task.assignee_id {
        let assigned =
            events::task_assigned(task_json(&task)?, project.team_id, task.project_id, &actor);
        events::emit_to_user(&state.hub, assignee_id, &assigned);
    }

    Ok(Json(response))
}

/// List a project's tasks with optional status/priority/assignee filters
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let (_, snapshot) = load_project_context(&state.db, project_id).await?;
    require_member(&snapshot, auth.user_id)?;

    let tasks = Task::list_by_project(
        &state.db,
        project_id,
        &TaskFilter {
            status: query.status,
            priority: query.priority,
            assignee_id: query.assignee_id,
        },
    )
    .await?;

    Ok(Json(tasks))
}

/// Get a task
pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResponse>> {
    let (task, _, snapshot) = load_task_context(&state.db, task_id).await?;
    require_member(&snapshot, auth.user_id)?;

    Ok(Json(build_task_response(&state.db, &task).await?))
}

/// General task field update
///
/// A status change folded into this update is gated exactly like the
/// dedicated status endpoint; sending the current status is a no-op, not a
/// transition. An update that changes nothing succeeds with an empty diff.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    validate_request(&req)?;

    let (task, team_id, snapshot) = load_task_context(&state.db, task_id).await?;
    require_member(&snapshot, auth.user_id)?;

    let mut update = TaskUpdate::from(&task);
    let mut changes = serde_json::Map::new();

    if let Some(title) = req.title {
        if title != task.title {
            changes.insert("title".to_string(), json!({ "old": task.title, "new": title }));
            update.title = title;
        }
    }
    if let Some(description) = req.description {
        if Some(&description) != task.description.as_ref() {
            changes.insert(
                "description".to_string(),
                json!({ "old": task.description, "new": description }),
            );
            update.description = Some(description);
        }
    }
    if let Some(priority) = req.priority {
        if priority != task.priority {
            changes.insert(
                "priority".to_string(),
                json!({ "old": task.priority, "new": priority }),
            );
            update.priority = priority;
        }
    }
    if let Some(due_date) = req.due_date {
        if Some(due_date) != task.due_date {
            changes.insert(
                "due_date".to_string(),
                json!({ "old": task.due_date, "new": due_date }),
            );
            update.due_date = Some(due_date);
        }
    }

    let mut status_change: Option<(TaskStatus, TaskStatus)> = None;
    if let Some(status) = req.status {
        if status != task.status {
            if !task.status.can_transition_to(status) {
                return Err(ApiError::InvalidTransition {
                    from: task.status,
                    to: status,
                });
            }
            changes.insert(
                "status".to_string(),
                json!({ "old": task.status, "new": status }),
            );
            status_change = Some((task.status, status));
            update.status = status;
        }
    }

    let mut assignee_change: Option<Option<Uuid>> = None;
    if let Some(assignee_id) = req.assignee_id {
        if assignee_id != task.assignee_id {
            if let Some(id) = assignee_id {
                check_assignee(&snapshot, id)?;
            }
            changes.insert(
                "assignee_id".to_string(),
                json!({ "old": task.assignee_id, "new": assignee_id }),
            );
            assignee_change = Some(assignee_id);
            update.assignee_id = assignee_id;
        }
    }

    let changes = serde_json::Value::Object(changes);

    let task = Task::update(&state.db, task_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id,
            action: ActivityAction::Updated,
            entity: ActivityEntity::Task,
            entity_id: task.id,
            metadata: changes.clone(),
        },
    );
    if let Some((old, new)) = status_change {
        record_activity(
            &state.db,
            RecordActivity {
                user_id: auth.user_id,
                team_id,
                action: ActivityAction::StatusChanged,
                entity: ActivityEntity::Task,
                entity_id: task.id,
                metadata: json!({ "old_status": old, "new_status": new }),
            },
        );
    }
    if let Some(assignee_id) = assignee_change {
        record_activity(
            &state.db,
            RecordActivity {
                user_id: auth.user_id,
                team_id,
                action: match assignee_id {
                    Some(_) => ActivityAction::Assigned,
                    None => ActivityAction::Unassigned,
                },
                entity: ActivityEntity::Task,
                entity_id: task.id,
                metadata: json!({ "assignee_id": assignee_id }),
            },
        );
    }

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let response = build_task_response(&state.db, &task).await?;

    let event = events::task_updated(
        task_json(&task)?,
        team_id,
        task.project_id,
        changes,
        &actor,
    );
    events::emit_to_team(&state.hub, team_id, &event);

    if let Some(Some(new_assignee)) = assignee_change {
        let assigned = events::task_assigned(task_json(&task)?, team_id, task.project_id, &actor);
        events::emit_to_user(&state.hub, new_assignee, &assigned);
    }

    Ok(Json(response))
}

/// Explicit status transition
///
/// Unlike the general update, sending the current status here is an error:
/// the endpoint exists to perform a transition, and the table defines no
/// self-edges.
pub async fn update_task_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let (task, team_id, snapshot) = load_task_context(&state.db, task_id).await?;
    require_member(&snapshot, auth.user_id)?;

    if !task.status.can_transition_to(req.status) {
        return Err(ApiError::InvalidTransition {
            from: task.status,
            to: req.status,
        });
    }

    let old_status = task.status;
    let mut update = TaskUpdate::from(&task);
    update.status = req.status;

    let task = Task::update(&state.db, task_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id,
            action: ActivityAction::StatusChanged,
            entity: ActivityEntity::Task,
            entity_id: task.id,
            metadata: json!({ "old_status": old_status, "new_status": task.status }),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let response = build_task_response(&state.db, &task).await?;

    let changes = json!({ "status": { "old": old_status, "new": task.status } });
    let event = events::task_updated(
        task_json(&task)?,
        team_id,
        task.project_id,
        changes,
        &actor,
    );
    events::emit_to_team(&state.hub, team_id, &event);

    Ok(Json(response))
}

/// Assign or unassign a task
///
/// The new assignee, if any, must be a member of the task's team, and gets
/// a personal `task:assigned` notification.
pub async fn assign_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<AssignTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let (task, team_id, snapshot) = load_task_context(&state.db, task_id).await?;
    require_member(&snapshot, auth.user_id)?;

    if let Some(assignee_id) = req.assignee_id {
        check_assignee(&snapshot, assignee_id)?;
    }

    let old_assignee = task.assignee_id;
    let mut update = TaskUpdate::from(&task);
    update.assignee_id = req.assignee_id;

    let task = Task::update(&state.db, task_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    if old_assignee != task.assignee_id {
        record_activity(
            &state.db,
            RecordActivity {
                user_id: auth.user_id,
                team_id,
                action: match task.assignee_id {
                    Some(_) => ActivityAction::Assigned,
                    None => ActivityAction::Unassigned,
                },
                entity: ActivityEntity::Task,
                entity_id: task.id,
                metadata: json!({ "assignee_id": task.assignee_id }),
            },
        );
    }

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let response = build_task_response(&state.db, &task).await?;

    if old_assignee != task.assignee_id {
        let changes = json!({ "assignee_id": { "old": old_assignee, "new": task.assignee_id } });
        let event = events::task_updated(
            task_json(&task)?,
            team_id,
            task.project_id,
            changes,
            &actor,
        );
        events::emit_to_team(&state.hub, team_id, &event);

        if let Some(new_assignee) = task.assignee_id {
            let assigned =
                events::task_assigned(task_json(&task)?, team_id, task.project_id, &actor);
            events::emit_to_user(&state.hub, new_assignee, &assigned);
        }
    }

    Ok(Json(response))
}

/// Delete a task
///
/// Allowed for team admins, the team owner, and the task's creator.
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let (task, team_id, snapshot) = load_task_context(&state.db, task_id).await?;
    require_member(&snapshot, auth.user_id)?;

    if !is_admin_or_owner(&snapshot, auth.user_id) && task.created_by != auth.user_id {
        return Err(ApiError::Forbidden(
            "Only admins, the owner, or the task's creator may delete it".to_string(),
        ));
    }

    Task::delete(&state.db, task_id).await?;

    record_activity(
        &state.db,
        RecordActivity {
            user_id: auth.user_id,
            team_id,
            action: ActivityAction::Deleted,
            entity: ActivityEntity::Task,
            entity_id: task.id,
            metadata: json!({ "title": task.title }),
        },
    );

    let actor = actor_ref(&state.db, auth.user_id).await?;
    let event = events::task_deleted(task.id, team_id, task.project_id, &actor);
    events::emit_to_team(&state.hub, team_id, &event);

    Ok(Json(MessageResponse {
        message: "Task deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignee_field_absent_vs_null() {
        let absent: UpdateTaskRequest = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(absent.assignee_id, None);

        let null: UpdateTaskRequest =
            serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(null.assignee_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateTaskRequest =
            serde_json::from_str(&format!(r#"{{"assignee_id": "{}"}}"#, id)).unwrap();
        assert_eq!(set.assignee_id, Some(Some(id)));
    }
}
