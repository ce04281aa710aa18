/// Realtime fan-out contract
///
/// These tests drive the hub and the event constructors directly, the same
/// way the route handlers do, and assert on the frames a connected client
/// would receive. No database or socket is involved.

use serde_json::Value;
use teamflow_api::realtime::{events, team_room, user_room, RealtimeHub};
use teamflow_shared::models::team::TeamRole;
use teamflow_shared::models::user::UserRef;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

fn user(name: &str) -> UserRef {
    UserRef {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@example.com", name),
    }
}

/// Registers a connection in the given rooms, returning its inbox
fn connect(hub: &RealtimeHub, rooms: &[String]) -> UnboundedReceiver<String> {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    for room in rooms {
        hub.join(room, conn_id, tx.clone());
    }
    rx
}

fn recv_frame(rx: &mut UnboundedReceiver<String>) -> Value {
    serde_json::from_str(&rx.try_recv().expect("expected a frame")).unwrap()
}

#[tokio::test]
async fn test_member_removed_reaches_team_and_personal_rooms() {
    let hub = RealtimeHub::new();
    let team_id = Uuid::new_v4();
    let admin = user("alice");
    let removed = user("bob");

    // Another member watches the team room; the removed user holds both
    // their team-room subscription and their personal room.
    let mut watcher = connect(&hub, &[team_room(team_id)]);
    let mut removed_inbox = connect(&hub, &[team_room(team_id), user_room(removed.id)]);

    // Exactly what the remove-member handler does after the delete.
    let event = events::member_removed(team_id, &removed, &admin);
    events::emit_to_team(&hub, team_id, &event);
    events::emit_to_user(&hub, removed.id, &event);

    // The watcher gets one team copy, without the personal flag.
    let frame = recv_frame(&mut watcher);
    assert_eq!(frame["event"], "member:removed");
    assert_eq!(frame["data"]["teamId"], team_id.to_string());
    assert_eq!(frame["data"]["member"]["id"], removed.id.to_string());
    assert_eq!(frame["data"]["removedBy"]["name"], "alice");
    assert!(frame["data"].get("isPersonal").is_none());
    assert!(watcher.try_recv().is_err());

    // The removed user gets the team copy and then the personal copy, and
    // only the personal copy carries the flag.
    let team_copy = recv_frame(&mut removed_inbox);
    assert!(team_copy["data"].get("isPersonal").is_none());

    let personal_copy = recv_frame(&mut removed_inbox);
    assert_eq!(personal_copy["event"], "member:removed");
    assert_eq!(personal_copy["data"]["isPersonal"], true);
    assert!(removed_inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_task_assignment_notifies_assignee_personally() {
    let hub = RealtimeHub::new();
    let team_id = Uuid::new_v4();
    let project_id = Uuid::new_v4();
    let actor = user("alice");
    let assignee = user("bob");

    let mut watcher = connect(&hub, &[team_room(team_id)]);
    let mut assignee_inbox = connect(&hub, &[user_room(assignee.id)]);

    let task = serde_json::json!({ "id": Uuid::new_v4(), "title": "Ship it" });
    let changes =
        serde_json::json!({ "assignee_id": { "old": null, "new": assignee.id } });

    let updated = events::task_updated(task.clone(), team_id, project_id, changes, &actor);
    events::emit_to_team(&hub, team_id, &updated);

    let assigned = events::task_assigned(task, team_id, project_id, &actor);
    events::emit_to_user(&hub, assignee.id, &assigned);

    let frame = recv_frame(&mut watcher);
    assert_eq!(frame["event"], "task:updated");
    assert_eq!(frame["data"]["projectId"], project_id.to_string());
    assert_eq!(
        frame["data"]["changes"]["assignee_id"]["new"],
        assignee.id.to_string()
    );

    let frame = recv_frame(&mut assignee_inbox);
    assert_eq!(frame["event"], "task:assigned");
    assert_eq!(frame["data"]["isPersonal"], true);
    assert_eq!(frame["data"]["assignedBy"]["name"], "alice");
    assert_eq!(frame["data"]["task"]["title"], "Ship it");
}

#[tokio::test]
async fn test_events_arrive_in_emission_order() {
    let hub = RealtimeHub::new();
    let team_id = Uuid::new_v4();
    let actor = user("alice");

    let mut inbox = connect(&hub, &[team_room(team_id)]);

    let project = serde_json::json!({ "id": Uuid::new_v4() });
    events::emit_to_team(
        &hub,
        team_id,
        &events::project_created(project.clone(), team_id, &actor),
    );
    events::emit_to_team(
        &hub,
        team_id,
        &events::project_updated(
            project,
            team_id,
            serde_json::json!({ "name": { "old": "a", "new": "b" } }),
            &actor,
        ),
    );
    events::emit_to_team(
        &hub,
        team_id,
        &events::project_deleted(Uuid::new_v4(), team_id, &actor),
    );

    let order: Vec<String> = (0..3)
        .map(|_| recv_frame(&mut inbox)["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        order,
        vec!["project:created", "project:updated", "project:deleted"]
    );
}

#[tokio::test]
async fn test_leaving_team_room_keeps_personal_room() {
    let hub = RealtimeHub::new();
    let team_id = Uuid::new_v4();
    let actor = user("alice");
    let member = user("bob");

    let conn_id = Uuid::new_v4();
    let (tx, mut inbox) = mpsc::unbounded_channel();
    hub.join(&team_room(team_id), conn_id, tx.clone());
    hub.join(&user_room(member.id), conn_id, tx);

    // Leave the team room, as the socket does on a leave_team frame.
    hub.leave(&team_room(team_id), conn_id);

    events::emit_to_team(&hub, team_id, &events::team_deleted(team_id, &actor));
    assert!(inbox.try_recv().is_err());

    // Personal delivery is unaffected.
    let event = events::member_role_updated(team_id, &member, TeamRole::Admin, &actor);
    events::emit_to_user(&hub, member.id, &event);

    let frame: Value = serde_json::from_str(&inbox.try_recv().unwrap()).unwrap();
    assert_eq!(frame["event"], "member:role_updated");
    assert_eq!(frame["data"]["role"], "admin");
    assert_eq!(frame["data"]["isPersonal"], true);
}
