/// Database utilities
///
/// This module provides database connection pooling and migration helpers.

pub mod migrations;
pub mod pool;

pub use migrations::run_migrations;
pub use pool::{create_pool, health_check, DatabaseConfig};
