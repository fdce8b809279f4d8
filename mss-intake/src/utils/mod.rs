//! Utility modules for mss-intake

pub mod db_retry;

pub use db_retry::retry_transient;
