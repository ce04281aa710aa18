//! # Teamflow Shared Library
//!
//! This crate contains shared types, utilities, and business logic used by
//! the Teamflow API server.
//!
//! ## Module Organization
//!
//! - `models`: Database models and data structures (users, teams, projects,
//!   tasks, activities)
//! - `auth`: Authentication (JWT, passwords, OTP) and the pure team
//!   authorization model
//! - `db`: Connection pool and migration helpers

pub mod auth;
pub mod db;
pub mod models;

/// Current version of the Teamflow shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
