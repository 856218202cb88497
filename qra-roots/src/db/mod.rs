//! Database repositories
//!
//! Schema creation lives in `qra_common::db`; these modules hold the
//! queries the pipeline runs against it.

pub mod jobs;
pub mod roots;
pub mod tokens;

pub use tokens::{StatusCounts, TokenUpdate};
