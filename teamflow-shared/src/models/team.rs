/// Team model and database operations
///
/// Teams are the unit of collaboration: every project, task, and activity
/// hangs off a team, and every access decision is made against a team's
/// member list.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE team_role AS ENUM ('owner', 'admin', 'member');
///
/// CREATE TABLE teams (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(100) NOT NULL,
///     description TEXT,
///     owner_id UUID NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE team_members (
///     team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role team_role NOT NULL DEFAULT 'member',
///     joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (team_id, user_id)
/// );
/// ```
///
/// The composite primary key on `team_members` enforces the "a user appears
/// at most once per team" invariant, and makes adding a member a single
/// atomic INSERT rather than a read-modify-write.
///
/// # Roles
///
/// - **owner**: one per team (the `owner_id` column); cannot be removed,
///   demoted, or leave - only delete the team
/// - **admin**: can update the team, invite and remove members, manage
///   projects
/// - **member**: can view everything and work on tasks
///
/// Access checks never consult these rows directly; handlers load a
/// [`TeamSnapshot`] and evaluate it with the pure functions in
/// `auth::authorization`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Role of a user within a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "team_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    /// The single owning user; full control including deletion
    Owner,

    /// Can manage the team, its members, and its projects
    Admin,

    /// Can view team resources and work on tasks
    Member,
}

impl TeamRole {
    /// Converts role to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
        }
    }
}

/// Team model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    /// Unique team ID
    pub id: Uuid,

    /// Team name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Owning user; immutable after creation (ownership transfer is not
    /// supported)
    pub owner_id: Uuid,

    /// When the team was created
    pub created_at: DateTime<Utc>,

    /// When the team was last updated
    pub updated_at: DateTime<Utc>,
}

/// One entry in a team's member list
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamMember {
    /// Team ID
    pub team_id: Uuid,

    /// User ID
    pub user_id: Uuid,

    /// Role within the team
    pub role: TeamRole,

    /// When the user joined
    pub joined_at: DateTime<Utc>,
}

/// A consistent read of a team and its full member list
///
/// This is the value the authorization model evaluates. It is loaded fresh
/// per request so membership changes take effect immediately; nothing
/// caches it across requests.
#[derive(Debug, Clone)]
pub struct TeamSnapshot {
    /// The team row
    pub team: Team,

    /// All member entries, in join order
    pub members: Vec<TeamMember>,
}

/// Input for creating a new team
#[derive(Debug, Clone)]
pub struct CreateTeam {
    /// Team name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Creator, who becomes the owner
    pub owner_id: Uuid,
}

/// Input for updating a team
#[derive(Debug, Clone, Default)]
pub struct UpdateTeam {
    /// New name, if changing
    pub name: Option<String>,

    /// New description, if changing
    pub description: Option<String>,
}

impl Team {
    /// Creates a new team with the creator as sole member and owner
    ///
    /// The team row and the owner's member entry are written in one
    /// transaction, so a team is never observable without its owner in the
    /// member list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub async fn create(pool: &PgPool, data: CreateTeam) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let team = sqlx::query_as::<_, Team>(
            r#"
            INSERT INTO teams (name, description, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.owner_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO team_members (team_id, user_id, role)
            VALUES ($1, $2, 'owner')
            "#,
        )
        .bind(team.id)
        .bind(data.owner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(team)
    }

    /// Finds a team by ID
    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Team>(
            r#"
            SELECT id, name, description, owner_id, created_at, updated_at
            FROM teams
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Loads a team together with its full member list
    ///
    /// Returns `None` if the team doesn't exist. This is the snapshot every
    /// access check evaluates; it must be reloaded per request, never cached.
    pub async fn load_snapshot(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<TeamSnapshot>, sqlx::Error> {
        let Some(team) = Self::find(pool, id).await? else {
            return Ok(None);
        };

        let members = Self::members(pool, id).await?;

        Ok(Some(TeamSnapshot { team, members }))
    }

    /// Lists all teams a user belongs to, most recently created first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Team>(
            r#"
            SELECT t.id, t.name, t.description, t.owner_id, t.created_at, t.updated_at
            FROM teams t
            JOIN team_members m ON m.team_id = t.id
            WHERE m.user_id = $1
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Updates a team's name and/or description
    ///
    /// Returns the updated team, or `None` if it doesn't exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTeam,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Team>(
            r#"
            UPDATE teams
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.description)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a team
    ///
    /// Member entries cascade with the team. Projects and tasks that
    /// reference the team are NOT deleted; they become orphaned.
    ///
    /// Returns true if a team was deleted.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists a team's members in join order
    pub async fn members(pool: &PgPool, team_id: Uuid) -> Result<Vec<TeamMember>, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(
            r#"
            SELECT team_id, user_id, role, joined_at
            FROM team_members
            WHERE team_id = $1
            ORDER BY joined_at ASC
            "#,
        )
        .bind(team_id)
        .fetch_all(pool)
        .await
    }

    /// Adds a member to a team
    ///
    /// A single INSERT; the composite primary key rejects a duplicate
    /// membership atomically (surfaced as a unique-constraint database
    /// error, which callers map to Conflict).
    pub async fn add_member(
        pool: &PgPool,
        team_id: Uuid,
        user_id: Uuid,
        role: TeamRole,
    ) -> Result<TeamMember, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(
            r#"
            INSERT INTO team_members (team_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING team_id, user_id, role, joined_at
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(pool)
        .await
    }

    /// Removes a member from a team
    ///
    /// Returns true if a member entry was deleted. Callers are responsible
    /// for refusing to remove the owner before calling this.
    pub async fn remove_member(
        pool: &PgPool,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Updates a member's role
    ///
    /// Returns the updated entry, or `None` if the user is not a member.
    /// Callers are responsible for refusing to change the owner's role.
    pub async fn update_member_role(
        pool: &PgPool,
        team_id: Uuid,
        user_id: Uuid,
        role: TeamRole,
    ) -> Result<Option<TeamMember>, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(
            r#"
            UPDATE team_members
            SET role = $3
            WHERE team_id = $1 AND user_id = $2
            RETURNING team_id, user_id, role, joined_at
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_role_as_str() {
        assert_eq!(TeamRole::Owner.as_str(), "owner");
        assert_eq!(TeamRole::Admin.as_str(), "admin");
        assert_eq!(TeamRole::Member.as_str(), "member");
    }

    #[test]
    fn test_team_role_serde() {
        assert_eq!(serde_json::to_string(&TeamRole::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::from_str::<TeamRole>("\"member\"").unwrap(),
            TeamRole::Member
        );
    }

    // Integration tests for database operations are in the workspace tests
}
