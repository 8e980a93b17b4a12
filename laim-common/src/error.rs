//! Errors shared by the LAIM crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Bootstrap and storage failures
#[derive(Error, Debug)]
pub enum Error {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Config file or data directory could not be read or created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable TOML or an invalid setting
    #[error("Configuration error: {0}")]
    Config(String),
}
