//! Staybook payment backend
//!
//! Manages the lifecycle of reservation payments against the Chapa gateway:
//! idempotent initiation, guarded status transitions and reconciliation of
//! asynchronous verification results.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;
pub mod state;
