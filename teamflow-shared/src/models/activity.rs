/// Activity audit log model
///
/// Activities are immutable, append-only records of every mutation: who did
/// what, to which entity, in which team, with action-specific metadata (for
/// example `{"old_status": "todo", "new_status": "in_progress"}` for a status
/// change). Rows are never updated; they are removed only by the retention
/// purge or when their owning team is deleted.
///
/// Recording is fire-and-forget from the caller's perspective: controllers
/// submit it as a background task and never let a failed insert fail or
/// delay the mutation it documents.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE activity_action AS ENUM (
///     'created', 'updated', 'deleted', 'assigned', 'unassigned',
///     'status_changed', 'member_added', 'member_removed', 'role_changed'
/// );
/// CREATE TYPE activity_entity AS ENUM ('task', 'project', 'team', 'user');
///
/// CREATE TABLE activities (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL,
///     team_id UUID NOT NULL,
///     action activity_action NOT NULL,
///     entity activity_entity NOT NULL,
///     entity_id UUID NOT NULL,
///     metadata JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Created,
    Updated,
    Deleted,
    Assigned,
    Unassigned,
    StatusChanged,
    MemberAdded,
    MemberRemoved,
    RoleChanged,
}

/// What kind of entity it happened to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_entity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivityEntity {
    Task,
    Project,
    Team,
    User,
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
    /// Unique record ID
    pub id: Uuid,

    /// Acting user
    pub user_id: Uuid,

    /// Team the entity belongs to
    pub team_id: Uuid,

    /// What happened
    pub action: ActivityAction,

    /// Entity kind
    pub entity: ActivityEntity,

    /// Entity ID
    pub entity_id: Uuid,

    /// Action-specific details (field diffs, old/new values)
    pub metadata: JsonValue,

    /// When it happened
    pub created_at: DateTime<Utc>,
}

/// Input for recording an activity
#[derive(Debug, Clone)]
pub struct RecordActivity {
    /// Acting user
    pub user_id: Uuid,

    /// Team the entity belongs to
    pub team_id: Uuid,

    /// What happened
    pub action: ActivityAction,

    /// Entity kind
    pub entity: ActivityEntity,

    /// Entity ID
    pub entity_id: Uuid,

    /// Action-specific details
    pub metadata: JsonValue,
}

/// Filters for listing a team's activity
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    /// Only records about this entity kind
    pub entity: Option<ActivityEntity>,

    /// Only records with this action
    pub action: Option<ActivityAction>,

    /// Only records by this actor
    pub actor: Option<Uuid>,

    /// Only records at or after this time
    pub from: Option<DateTime<Utc>>,

    /// Only records at or before this time
    pub to: Option<DateTime<Utc>>,
}

/// One row of the (entity, action) aggregation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityStat {
    /// Entity kind
    pub entity: ActivityEntity,

    /// Action
    pub action: ActivityAction,

    /// Number of records in the window
    pub count: i64,
}

impl Activity {
    /// Appends an audit record
    pub async fn record(pool: &PgPool, data: RecordActivity) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Activity>(
            r#"
            INSERT INTO activities (user_id, team_id, action, entity, entity_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, team_id, action, entity, entity_id, metadata, created_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.team_id)
        .bind(data.action)
        .bind(data.entity)
        .bind(data.entity_id)
        .bind(&data.metadata)
        .fetch_one(pool)
        .await
    }

    /// Lists a team's activity, newest first, paginated and filtered
    pub async fn list_by_team(
        pool: &PgPool,
        team_id: Uuid,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = sqlx::QueryBuilder::new(
            "SELECT id, user_id, team_id, action, entity, entity_id, metadata, created_at \
             FROM activities WHERE team_id = ",
        );
        query.push_bind(team_id);
        push_filters(&mut query, filter);

        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        query.build_query_as::<Activity>().fetch_all(pool).await
    }

    /// Counts a team's activity under the same filters, for pagination
    pub async fn count_by_team(
        pool: &PgPool,
        team_id: Uuid,
        filter: &ActivityFilter,
    ) -> Result<i64, sqlx::Error> {
        let mut query =
            sqlx::QueryBuilder::new("SELECT COUNT(*) FROM activities WHERE team_id = ");
        query.push_bind(team_id);
        push_filters(&mut query, filter);

        let (count,): (i64,) = query.build_query_as().fetch_one(pool).await?;
        Ok(count)
    }

    /// Lists the audit trail of one entity, newest first
    pub async fn list_by_entity(
        pool: &PgPool,
        entity: ActivityEntity,
        entity_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Activity>(
            r#"
            SELECT id, user_id, team_id, action, entity, entity_id, metadata, created_at
            FROM activities
            WHERE entity = $1 AND entity_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(entity)
        .bind(entity_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Lists one actor's activity across all teams, newest first
    pub async fn list_by_actor(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Activity>(
            r#"
            SELECT id, user_id, team_id, action, entity, entity_id, metadata, created_at
            FROM activities
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Aggregates a team's activity counts by (entity, action) over a
    /// trailing window of days
    pub async fn stats(
        pool: &PgPool,
        team_id: Uuid,
        days: i64,
    ) -> Result<Vec<ActivityStat>, sqlx::Error> {
        sqlx::query_as::<_, ActivityStat>(
            r#"
            SELECT entity, action, COUNT(*) AS count
            FROM activities
            WHERE team_id = $1
              AND created_at >= NOW() - ($2 || ' days')::interval
            GROUP BY entity, action
            ORDER BY count DESC
            "#,
        )
        .bind(team_id)
        .bind(days.to_string())
        .fetch_all(pool)
        .await
    }

    /// Deletes records older than the retention window
    ///
    /// Postgres has no TTL index, so a periodic purge task calls this.
    /// Returns the number of records removed.
    pub async fn purge_older_than(pool: &PgPool, days: i64) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM activities WHERE created_at < NOW() - ($1 || ' days')::interval")
                .bind(days.to_string())
                .execute(pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// Deletes all of a team's records when the team itself is deleted
    pub async fn delete_by_team(pool: &PgPool, team_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM activities WHERE team_id = $1")
            .bind(team_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn push_filters(query: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>, filter: &ActivityFilter) {
    if let Some(entity) = filter.entity {
        query.push(" AND entity = ");
        query.push_bind(entity);
    }
    if let Some(action) = filter.action {
        query.push(" AND action = ");
        query.push_bind(action);
    }
    if let Some(actor) = filter.actor {
        query.push(" AND user_id = ");
        query.push_bind(actor);
    }
    if let Some(from) = filter.from {
        query.push(" AND created_at >= ");
        query.push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND created_at <= ");
        query.push_bind(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&ActivityAction::StatusChanged).unwrap(),
            "\"status_changed\""
        );
        assert_eq!(
            serde_json::from_str::<ActivityAction>("\"member_added\"").unwrap(),
            ActivityAction::MemberAdded
        );
    }

    #[test]
    fn test_entity_serde() {
        assert_eq!(
            serde_json::to_string(&ActivityEntity::Project).unwrap(),
            "\"project\""
        );
    }
}
