//! Domain models for Tollgate.
//!
//! These are the core types shared across all crates.

pub mod account;
pub mod api_key;
pub mod audit;
pub mod auth_context;
pub mod budget;
pub mod cache_entry;
pub mod completion;
pub mod session;
pub mod tenant;
