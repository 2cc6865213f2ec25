//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Custom assertion macros
//! - A minimal y-sync client
//! - Server fixtures over in-memory stores

pub mod assertions;
pub mod client;
#[cfg(feature = "ssr")]
pub mod fixtures;

// Re-export commonly used utilities
pub use client::*;
#[cfg(feature = "ssr")]
pub use fixtures::*;
