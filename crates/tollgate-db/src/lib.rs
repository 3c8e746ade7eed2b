//! Tollgate storage backends.
//!
//! This crate provides:
//! - SurrealDB connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - SurrealDB implementations of every `tollgate-core` repository trait
//!   ([`repository`])
//! - An in-process [`MemoryStore`] implementing the same traits
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod memory;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use memory::MemoryStore;
pub use schema::{run_migrations, schema_v1};
