//! # TeamFlow API Server Library
//!
//! This library provides the core functionality for the TeamFlow API server.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `mailer`: Outbound mail transport
//! - `realtime`: WebSocket rooms and event fan-out
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod mailer;
pub mod realtime;
pub mod routes;
