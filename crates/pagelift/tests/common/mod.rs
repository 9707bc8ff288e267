//! Shared test utilities for pagelift integration tests.
//!
//! This module provides:
//! - `TestHarness`: an engine wired to a recording uploader
//! - Builders for zip archives, in-memory rar engines and directory trees

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
