//! Errors raised while bootstrapping a service: root folder, config file and
//! database setup. Request-time failures use each service's own error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Opening the pool, running migrations or reading settings failed
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Root folder or TOML config could not be created, read or written
    #[error("Configuration error: {0}")]
    Config(String),
}
