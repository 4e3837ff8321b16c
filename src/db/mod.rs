//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer with compare-and-swap updates for contended rows

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{CoproducerError, Repository, TransitionWrite};
