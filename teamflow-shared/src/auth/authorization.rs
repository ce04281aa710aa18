/// The team authorization model
///
/// Pure, side-effect-free access checks over a [`TeamSnapshot`]. Handlers
/// load a fresh snapshot, evaluate one of these functions, and short-circuit
/// with Forbidden on failure - no mutation is attempted after a failed
/// check. Nothing here touches the database, so the policy is trivially
/// testable and cannot go stale within a single request.
///
/// # Policy
///
/// | Action | Required |
/// |---|---|
/// | View team / project / task | member |
/// | Update team, invite member, remove member | admin or owner |
/// | Delete team, change member role | owner |
/// | Create project or task | member |
/// | Update or delete project | admin or owner |
/// | Delete task | admin or owner, or the task's creator |
/// | Update task | member |
/// | Leave team | member, and not the owner |
///
/// The owner is a member by definition, even when absent from the member
/// list; `owner_id` is authoritative.
///
/// # Example
///
/// ```no_run
/// use teamflow_shared::auth::authorization::{require_member, require_owner};
/// use teamflow_shared::models::team::TeamSnapshot;
/// use uuid::Uuid;
///
/// # fn example(snapshot: &TeamSnapshot, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// require_member(snapshot, user_id)?;   // view access
/// require_owner(snapshot, user_id)?;    // delete the team
/// # Ok(())
/// # }
/// ```

use uuid::Uuid;

use crate::models::team::{TeamRole, TeamSnapshot};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// User is not a member of the team
    #[error("Not a member of this team")]
    NotMember,

    /// Action requires admin or owner role
    #[error("Requires admin or owner role")]
    RequiresAdmin,

    /// Action requires the team owner
    #[error("Only the team owner may perform this action")]
    RequiresOwner,

    /// Action targets the owner, who cannot be removed, demoted, or leave
    #[error("The team owner cannot be removed or have their role changed")]
    OwnerImmutable,
}

/// Checks whether a user is a member of the team
///
/// True if the user is the owner or appears in the member list with any
/// role. Presence is sufficient; the role is not filtered here.
pub fn is_member(snapshot: &TeamSnapshot, user_id: Uuid) -> bool {
    snapshot.team.owner_id == user_id
        || snapshot.members.iter().any(|m| m.user_id == user_id)
}

/// Checks whether a user is an admin or the owner of the team
pub fn is_admin_or_owner(snapshot: &TeamSnapshot, user_id: Uuid) -> bool {
    snapshot.team.owner_id == user_id
        || snapshot.members.iter().any(|m| {
            m.user_id == user_id && matches!(m.role, TeamRole::Admin | TeamRole::Owner)
        })
}

/// Returns the user's role in the team, or `None` if not a member
///
/// The `owner_id` column wins over the member list, so the owner is
/// reported as `Owner` even if their member entry says otherwise (or is
/// missing entirely).
pub fn role_of(snapshot: &TeamSnapshot, user_id: Uuid) -> Option<TeamRole> {
    if snapshot.team.owner_id == user_id {
        return Some(TeamRole::Owner);
    }

    snapshot
        .members
        .iter()
        .find(|m| m.user_id == user_id)
        .map(|m| m.role)
}

/// Requires the user to be a member of the team
pub fn require_member(snapshot: &TeamSnapshot, user_id: Uuid) -> Result<(), AuthzError> {
    if is_member(snapshot, user_id) {
        Ok(())
    } else {
        Err(AuthzError::NotMember)
    }
}

/// Requires the user to be an admin or the owner of the team
pub fn require_admin_or_owner(snapshot: &TeamSnapshot, user_id: Uuid) -> Result<(), AuthzError> {
    if is_admin_or_owner(snapshot, user_id) {
        Ok(())
    } else if is_member(snapshot, user_id) {
        Err(AuthzError::RequiresAdmin)
    } else {
        Err(AuthzError::NotMember)
    }
}

/// Requires the user to be the team owner (strict equality, not
/// admin-or-owner)
pub fn require_owner(snapshot: &TeamSnapshot, user_id: Uuid) -> Result<(), AuthzError> {
    if snapshot.team.owner_id == user_id {
        Ok(())
    } else if is_member(snapshot, user_id) {
        Err(AuthzError::RequiresOwner)
    } else {
        Err(AuthzError::NotMember)
    }
}

/// Requires that a member-management action does not target the owner
///
/// The owner cannot be removed, have their role changed, or leave; the only
/// way out is deleting the team.
pub fn require_not_owner(snapshot: &TeamSnapshot, target_user_id: Uuid) -> Result<(), AuthzError> {
    if snapshot.team.owner_id == target_user_id {
        Err(AuthzError::OwnerImmutable)
    } else {
        Ok(())
    }
}
