//! # QRA Common Library
//!
//! Shared code for the root extraction workspace:
//! - Error type and result alias
//! - Root folder / TOML configuration loading
//! - Pipeline event bus
//! - SQLite schema initialization and token models

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
