//! memblk Common - Shared types and utilities
//!
//! This crate provides the error taxonomy and configuration structures
//! used across all memblk components.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};

/// Conventional sector size in bytes
pub const DEFAULT_SECTOR_SIZE: u32 = 512;
