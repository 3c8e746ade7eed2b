//! Tollgate Core — domain models, error types, storage traits and the
//! boundaries to external collaborators (model invocation, notification
//! delivery).
//!
//! Every other Tollgate crate builds on the types defined here.

pub mod deadline;
pub mod error;
pub mod events;
pub mod invoker;
pub mod models;
pub mod money;
pub mod period;
pub mod repository;
pub mod scope;

pub use error::{BudgetDenial, TollgateError, TollgateResult};
pub use money::Money;
