/// Database models
///
/// Each model owns its table's queries as associated async functions over a
/// `&PgPool`, returning plain data. Authorization and orchestration live in
/// the API layer; nothing here checks permissions.

pub mod activity;
pub mod project;
pub mod task;
pub mod team;
pub mod user;
