//! # LAIM Common Library
//!
//! Shared code for the LAIM inventory services:
//! - Error type shared across crates
//! - Bootstrap configuration loading (TOML)
//! - SQLite pool initialization and table creation

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;

pub use error::{Error, Result};
