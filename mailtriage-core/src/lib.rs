//! # mailtriage-core
//!
//! Core library for mailtriage - a local email triage and daily digest engine.
//!
//! This library provides:
//! - Domain types for threads, triage outputs, and tasks
//! - Database storage layer with SQLite
//! - Configuration management
//! - Logging infrastructure
//! - The triage cycle: classify changed threads, reconcile tasks, render the digest
//!
//! ## Architecture
//!
//! A cycle flows through three stages:
//! - **Observe:** list recent threads from a [`mail::MailProvider`] and gate on change markers
//! - **Classify:** triage changed threads (simulated rules or a delegated completion endpoint),
//!   validated against the triage schema
//! - **Act:** reconcile recommended actions into deduplicated tasks and render the open
//!   tasks as a bucketed HTML digest
//!
//! ## Example
//!
//! ```rust,no_run
//! use mailtriage_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use cycle::{CycleReport, TriageCycle};
pub use db::Database;
pub use error::{Error, Result};
pub use schema::TriageSchema;
pub use triage::TriageEngine;
pub use types::*;

// Public modules
pub mod config;
pub mod cycle;
pub mod db;
pub mod digest;
pub mod error;
pub mod followup;
pub mod logging;
pub mod mail;
pub mod reconcile;
pub mod schema;
pub mod staleness;
pub mod triage;
pub mod types;
