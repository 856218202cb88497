//! Test helper utilities
//!
//! Temporary databases, scripted extractors and a ready-made
//! [`PipelineContext`] for integration tests. No network access.

#![allow(dead_code)]

pub mod db_utils;
pub mod mock_extractor;

pub use db_utils::{create_test_db, seed_tokens, test_config, test_context};
pub use mock_extractor::MockExtractor;
