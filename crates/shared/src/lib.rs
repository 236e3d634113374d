//! LiveDesk Shared Types and Utilities
//!
//! This crate contains identifiers, errors, and database helpers shared across LiveDesk.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
