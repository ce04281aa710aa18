/// Realtime event payloads
///
/// Every event is a JSON frame `{"event": "<name>", "data": {...}}`. The
/// data object carries the serialized entity, the `teamId` scoping key
/// (plus `projectId` for tasks), and an actor reference under a
/// `<verb>By` key (`createdBy`, `updatedBy`, ...) so clients can render
/// "who did this" without another fetch. Update events additionally carry
/// a `changes` map of `field -> {old, new}`.
///
/// Personal copies of an event are the same frame with `isPersonal: true`
/// added to the data object; the team-room copy never carries the flag.

use serde_json::{json, Value as JsonValue};
use teamflow_shared::models::team::TeamRole;
use teamflow_shared::models::user::UserRef;
use uuid::Uuid;

use super::hub::{team_room, user_room, RealtimeHub};

/// A domain event ready for broadcast
#[derive(Debug, Clone)]
pub struct RealtimeEvent {
    /// Event name, e.g. `task:updated`
    pub name: &'static str,

    /// Data object without the personal flag
    pub data: JsonValue,
}

impl RealtimeEvent {
    /// Serializes the event as a wire frame
    ///
    /// The personal variant adds `isPersonal: true` to the data object.
    pub fn frame(&self, personal: bool) -> String {
        let mut data = self.data.clone();
        if personal {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("isPersonal".to_string(), json!(true));
            }
        }
        json!({ "event": self.name, "data": data }).to_string()
    }
}

/// Broadcasts an event to a team's room
pub fn emit_to_team(hub: &RealtimeHub, team_id: Uuid, event: &RealtimeEvent) {
    let delivered = hub.broadcast(&team_room(team_id), event.frame(false));
    tracing::debug!(event = event.name, %team_id, delivered, "Broadcast team event");
}

/// Sends a personal copy of an event to one user's room
pub fn emit_to_user(hub: &RealtimeHub, user_id: Uuid, event: &RealtimeEvent) {
    let delivered = hub.broadcast(&user_room(user_id), event.frame(true));
    tracing::debug!(event = event.name, %user_id, delivered, "Sent personal event");
}

fn actor(user: &UserRef) -> JsonValue {
    json!({ "id": user.id, "name": user.name, "email": user.email })
}

// ---------------------------------------------------------------------------
// Task events
// ---------------------------------------------------------------------------

pub fn task_created(
    task: JsonValue,
    team_id: Uuid,
    project_id: Uuid,
    created_by: &UserRef,
) -> RealtimeEvent {
    RealtimeEvent {
        name: "task:created",
        data: json!({
            "task": task,
            "teamId": team_id,
            "projectId": project_id,
            "createdBy": actor(created_by),
        }),
    }
}

pub fn task_updated(
    task: JsonValue,
    team_id: Uuid,
    project_id: Uuid,
    changes: JsonValue,
    updated_by: &UserRef,
) -> RealtimeEvent {
    RealtimeEvent {
        name: "task:updated",
        data: json!({
            "task": task,
            "teamId": team_id,
            "projectId": project_id,
            "changes": changes,
            "updatedBy": actor(updated_by),
        }),
    }
}

pub fn task_deleted(
    task_id: Uuid,
    team_id: Uuid,
    project_id: Uuid,
    deleted_by: &UserRef,
) -> RealtimeEvent {
    RealtimeEvent {
        name: "task:deleted",
        data: json!({
            "taskId": task_id,
            "teamId": team_id,
            "projectId": project_id,
            "deletedBy": actor(deleted_by),
        }),
    }
}

/// Assignment notification, sent personally to the new assignee
pub fn task_assigned(
    task: JsonValue,
    team_id: Uuid,
    project_id: Uuid,
    assigned_by: &UserRef,
) -> RealtimeEvent {
    RealtimeEvent {
        name: "task:assigned",
        data: json!({
            "task": task,
            "teamId": team_id,
            "projectId": project_id,
            "assignedBy": actor(assigned_by),
        }),
    }
}

// ---------------------------------------------------------------------------
// Project events
// ---------------------------------------------------------------------------

pub fn project_created(project: JsonValue, team_id: Uuid, created_by: &UserRef) -> RealtimeEvent {
    RealtimeEvent {
        name: "project:created",
        data: json!({
            "project": project,
            "teamId": team_id,
            "createdBy": actor(created_by),
        }),
    }
}

pub fn project_updated(
    project: JsonValue,
    team_id: Uuid,
    changes: JsonValue,
    updated_by: &UserRef,
) -> RealtimeEvent {
    RealtimeEvent {
        name: "project:updated",
        data: json!({
            "project": project,
            "teamId": team_id,
            "changes": changes,
            "updatedBy": actor(updated_by),
        }),
    }
}

pub fn project_deleted(project_id: Uuid, team_id: Uuid, deleted_by: &UserRef) -> RealtimeEvent {
    RealtimeEvent {
        name: "project:deleted",
        data: json!({
            "projectId": project_id,
            "teamId": team_id,
            "deletedBy": actor(deleted_by),
        }),
    }
}

// ---------------------------------------------------------------------------
// Team and membership events
// ---------------------------------------------------------------------------

pub fn team_updated(
    team: JsonValue,
    team_id: Uuid,
    changes: JsonValue,
    updated_by: &UserRef,
) -> RealtimeEvent {
    RealtimeEvent {
        name: "team:updated",
        data: json!({
            "team": team,
            "teamId": team_id,
            "changes": changes,
            "updatedBy": actor(updated_by),
        }),
    }
}

pub fn team_deleted(team_id: Uuid, deleted_by: &UserRef) -> RealtimeEvent {
    RealtimeEvent {
        name: "team:deleted",
        data: json!({
            "teamId": team_id,
            "deletedBy": actor(deleted_by),
        }),
    }
}

/// New member announcement, also sent personally to the added user
pub fn member_added(
    team_id: Uuid,
    member: &UserRef,
    role: TeamRole,
    added_by: &UserRef,
) -> RealtimeEvent {
    RealtimeEvent {
        name: "member:added",
        data: json!({
            "member": actor(member),
            "role": role,
            "teamId": team_id,
            "addedBy": actor(added_by),
        }),
    }
}

/// Removal announcement, also sent personally to the removed user
pub fn member_removed(team_id: Uuid, member: &UserRef, removed_by: &UserRef) -> RealtimeEvent {
    RealtimeEvent {
        name: "member:removed",
        data: json!({
            "member": actor(member),
            "teamId": team_id,
            "removedBy": actor(removed_by),
        }),
    }
}

/// Role change announcement, also sent personally to the affected user
pub fn member_role_updated(
    team_id: Uuid,
    member: &UserRef,
    role: TeamRole,
    changed_by: &UserRef,
) -> RealtimeEvent {
    RealtimeEvent {
        name: "member:role_updated",
        data: json!({
            "member": actor(member),
            "role": role,
            "teamId": team_id,
            "changedBy": actor(changed_by),
        }),
    }
}

/// Voluntary departure; the leaver is their own actor
pub fn member_left(team_id: Uuid, member: &UserRef) -> RealtimeEvent {
    RealtimeEvent {
        name: "member:left",
        data: json!({
            "member": actor(member),
            "teamId": team_id,
            "leftBy": actor(member),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserRef {
        UserRef {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.com", name),
        }
    }

    #[test]
    fn test_frame_shape() {
        let by = user("alice");
        let event = task_deleted(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), &by);

        let frame: JsonValue = serde_json::from_str(&event.frame(false)).unwrap();
        assert_eq!(frame["event"], "task:deleted");
        assert_eq!(frame["data"]["deletedBy"]["name"], "alice");
        assert!(frame["data"].get("isPersonal").is_none());
    }

    #[test]
    fn test_personal_flag_only_on_personal_copy() {
        let removed = user("bob");
        let by = user("alice");
        let event = member_removed(Uuid::new_v4(), &removed, &by);

        let team_copy: JsonValue = serde_json::from_str(&event.frame(false)).unwrap();
        let personal_copy: JsonValue = serde_json::from_str(&event.frame(true)).unwrap();

        assert!(team_copy["data"].get("isPersonal").is_none());
        assert_eq!(personal_copy["data"]["isPersonal"], true);
        assert_eq!(personal_copy["data"]["member"]["name"], "bob");
    }

    #[test]
    fn test_member_left_names_the_leaver_as_actor() {
        let leaver = user("carol");
        let event = member_left(Uuid::new_v4(), &leaver);

        let frame: JsonValue = serde_json::from_str(&event.frame(false)).unwrap();
        assert_eq!(frame["event"], "member:left");
        assert_eq!(frame["data"]["member"]["name"], "carol");
        assert_eq!(frame["data"]["leftBy"], frame["data"]["member"]);
    }

    #[test]
    fn test_update_events_carry_changes() {
        let by = user("alice");
        let changes = json!({ "status": { "old": "todo", "new": "in_progress" } });
        let event = task_updated(
            json!({ "id": "t1" }),
            Uuid::new_v4(),
            Uuid::new_v4(),
            changes,
            &by,
        );

        let frame: JsonValue = serde_json::from_str(&event.frame(false)).unwrap();
        assert_eq!(frame["data"]["changes"]["status"]["old"], "todo");
        assert_eq!(frame["data"]["changes"]["status"]["new"], "in_progress");
        assert_eq!(frame["data"]["updatedBy"]["name"], "alice");
    }

    #[test]
    fn test_role_update_carries_role() {
        let member = user("bob");
        let by = user("alice");
        let event = member_role_updated(Uuid::new_v4(), &member, TeamRole::Admin, &by);

        let frame: JsonValue = serde_json::from_str(&event.frame(true)).unwrap();
        assert_eq!(frame["event"], "member:role_updated");
        assert_eq!(frame["data"]["role"], "admin");
        assert_eq!(frame["data"]["isPersonal"], true);
    }
}
