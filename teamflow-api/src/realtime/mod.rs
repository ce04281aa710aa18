/// Realtime event fan-out
///
/// Every mutating controller action that affects team-visible state emits a
/// domain event to the room `team:{teamId}`. Four event kinds additionally
/// carry a personal copy to `user:{userId}` with `isPersonal: true`: task
/// assignment, member added, member removed, and member role updated.
///
/// - `hub`: the room/connection registry, constructed once at startup and
///   injected through `AppState`
/// - `events`: wire payload construction and emission helpers
/// - `socket`: the WebSocket endpoint and client join/leave protocol

pub mod events;
pub mod hub;
pub mod socket;

pub use hub::{team_room, user_room, RealtimeHub};
