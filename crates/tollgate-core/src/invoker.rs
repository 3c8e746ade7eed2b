//! Boundary to the model-invocation service.
//!
//! The control plane never builds prompts or talks to a model itself; it
//! hands the request and the budget reservation to an implementation of
//! [`ModelInvoker`] and receives the payload plus the actual metered
//! cost.

use uuid::Uuid;

use crate::error::TollgateResult;
use crate::models::budget::Reservation;
use crate::models::completion::{CompletionRequest, CompletionResponse};

pub trait ModelInvoker: Send + Sync {
    /// Perform one paid completion. An `Err` means nothing billable was
    /// produced and the reservation will be released.
    fn invoke(
        &self,
        tenant_id: Uuid,
        request: &CompletionRequest,
        reservation: &Reservation,
    ) -> impl Future<Output = TollgateResult<CompletionResponse>> + Send;
}
