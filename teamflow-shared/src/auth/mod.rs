/// Authentication and authorization
///
/// This module provides:
/// - JWT token generation and validation (`jwt`)
/// - Password hashing with Argon2id and first-password generation (`password`)
/// - One-time registration codes (`otp`)
/// - The pure team authorization model (`authorization`)
/// - Axum authentication context (`middleware`)

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod otp;
pub mod password;
