//! Database layer for mailtriage
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Change-marker tracking for incremental re-triage

pub mod repo;
pub mod schema;

pub use repo::Database;
