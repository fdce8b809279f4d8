//! # MySpeakingScore Common Library
//!
//! Shared code for the MySpeakingScore intake services including:
//! - Database initialization, migrations and runtime settings
//! - Placeholder lifecycle events (AdmissionEvent) and the EventBus
//! - Configuration loading and root folder resolution
//! - Utility functions

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use events::{AdmissionEvent, EventBus};
