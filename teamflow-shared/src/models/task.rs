/// Task model and the status transition engine
///
/// Tasks move through a fixed status state machine; every status change -
/// whether via the dedicated status endpoint or folded into a general field
/// update - is gated by [`TaskStatus::can_transition_to`].
///
/// # State Machine
///
/// ```text
/// todo         -> in_progress, done
/// in_progress  -> todo, review, done
/// review       -> in_progress, done
/// done         -> todo, in_progress, review
/// ```
///
/// Edges not listed are invalid. Note the asymmetry: review cannot go
/// straight back to todo, and a status can never "transition" to itself -
/// clients must skip no-op status writes.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('todo', 'in_progress', 'review', 'done');
/// CREATE TYPE task_priority AS ENUM ('low', 'medium', 'high', 'urgent');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     title VARCHAR(200) NOT NULL,
///     description TEXT,
///     priority task_priority NOT NULL DEFAULT 'medium',
///     status task_status NOT NULL DEFAULT 'todo',
///     due_date TIMESTAMPTZ,
///     assignee_id UUID,
///     project_id UUID NOT NULL,
///     created_by UUID NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Task workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Todo,

    /// Being worked on
    InProgress,

    /// Awaiting review
    Review,

    /// Finished
    Done,
}

impl TaskStatus {
    /// Converts status to string for display and event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }

    /// Checks if transition to the target status is valid
    ///
    /// Pure lookup in the adjacency table above. Same-status transitions
    /// are rejected: no status lists itself as a successor.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        match (self, target) {
            (TaskStatus::Todo, TaskStatus::InProgress) => true,
            (TaskStatus::Todo, TaskStatus::Done) => true,

            (TaskStatus::InProgress, TaskStatus::Todo) => true,
            (TaskStatus::InProgress, TaskStatus::Review) => true,
            (TaskStatus::InProgress, TaskStatus::Done) => true,

            (TaskStatus::Review, TaskStatus::InProgress) => true,
            (TaskStatus::Review, TaskStatus::Done) => true,

            (TaskStatus::Done, TaskStatus::Todo) => true,
            (TaskStatus::Done, TaskStatus::InProgress) => true,
            (TaskStatus::Done, TaskStatus::Review) => true,

            _ => false,
        }
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    /// Converts priority to string for display and event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

/// Task model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID
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

    /// Assigned user; must be a member of the owning team
    pub assignee_id: Option<Uuid>,

    /// Owning project (immutable)
    pub project_id: Uuid,

    /// User who created the task
    pub created_by: Uuid,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new task
#[derive(Debug, Clone)]
pub struct CreateTask {
    /// Task title
    pub title: String,

    /// Optional description
    pub description: Option<String>,

    /// Priority (defaults to medium)
    pub priority: TaskPriority,

    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,

    /// Optional assignee (membership-checked by the caller)
    pub assignee_id: Option<Uuid>,

    /// Owning project
    pub project_id: Uuid,

    /// Creator
    pub created_by: Uuid,
}

/// The complete post-update field set for a task
///
/// Handlers compute the final values (and the field diff) against the loaded
/// task before persisting, so the write is a single UPDATE with no
/// read-modify-write inside the model.
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee_id: Option<Uuid>,
}

impl From<&Task> for TaskUpdate {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            status: task.status,
            due_date: task.due_date,
            assignee_id: task.assignee_id,
        }
    }
}

/// Filters for listing a project's tasks
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks with this status
    pub status: Option<TaskStatus>,

    /// Only tasks with this priority
    pub priority: Option<TaskPriority>,

    /// Only tasks assigned to this user
    pub assignee_id: Option<Uuid>,
}

impl Task {
    /// Creates a new task in todo status
    pub async fn create(pool: &PgPool, data: CreateTask) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (title, description, priority, due_date, assignee_id,
                               project_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, title, description, priority, status, due_date, assignee_id,
                      project_id, created_by, created_at, updated_at
            "#,
        )
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.priority)
        .bind(data.due_date)
        .bind(data.assignee_id)
        .bind(data.project_id)
        .bind(data.created_by)
        .fetch_one(pool)
        .await
    }

    /// Finds a task by ID
    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, title, description, priority, status, due_date, assignee_id,
                   project_id, created_by, created_at, updated_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists a project's tasks with optional filters, most recently created
    /// first
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = sqlx::QueryBuilder::new(
            "SELECT id, title, description, priority, status, due_date, assignee_id, \
             project_id, created_by, created_at, updated_at \
             FROM tasks WHERE project_id = ",
        );
        query.push_bind(project_id);

        if let Some(status) = filter.status {
            query.push(" AND status = ");
            query.push_bind(status);
        }
        if let Some(priority) = filter.priority {
            query.push(" AND priority = ");
            query.push_bind(priority);
        }
        if let Some(assignee_id) = filter.assignee_id {
            query.push(" AND assignee_id = ");
            query.push_bind(assignee_id);
        }

        query.push(" ORDER BY created_at DESC");

        query.build_query_as::<Task>().fetch_all(pool).await
    }

    /// Persists the full post-update field set in one statement
    ///
    /// Returns the updated task, or `None` if it doesn't exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: TaskUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET title = $2,
                description = $3,
                priority = $4,
                status = $5,
                due_date = $6,
                assignee_id = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, title, description, priority, status, due_date, assignee_id,
                      project_id, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.priority)
        .bind(data.status)
        .bind(data.due_date)
        .bind(data.assignee_id)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a task
    ///
    /// Returns true if a task was deleted.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
