//! Tollgate Server — configuration, the completion gateway and the axum
//! HTTP surface over the auth, budget and cache crates.

pub mod audit_sink;
pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod invoker;
pub mod maintenance;
pub mod routes;
pub mod state;

pub use backend::{Backend, MemoryBackend, Repositories, SurrealBackend};
pub use config::{ConfigError, ServerConfig, StoreKind};
pub use gateway::{CompletionGateway, CompletionOutcome};
pub use invoker::HttpModelInvoker;
pub use routes::router;
pub use state::AppState;
