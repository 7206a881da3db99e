//! # Trends Common Library
//!
//! Shared code for the trend harvester crates:
//! - Category registry
//! - Configuration loading and validation
//! - Harvest event types and event bus
//! - Error types

pub mod categories;
pub mod config;
pub mod error;
pub mod events;

pub use categories::{Category, CategoryRegistry, ALL_SELECTOR};
pub use error::{Error, Result};
