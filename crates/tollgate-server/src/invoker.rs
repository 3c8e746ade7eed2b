//! HTTP client for the model-invocation service.

use std::time::Duration;

use reqwest::header::{self, HeaderValue};
use serde::Serialize;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::models::budget::Reservation;
use tollgate_core::models::completion::{CompletionRequest, CompletionResponse};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Serialize)]
struct InvokeBody<'a> {
    tenant_id: Uuid,
    reservation_id: Uuid,
    /// Ceiling the service must keep the metered cost under.
    max_cost: tollgate_core::Money,
    request: &'a CompletionRequest,
}

/// Posts completions to `{base_url}/v1/invoke`.
///
/// Calls are never retried here: a paid call that may have reached the
/// model must not be repeated. The reservation id is sent as the
/// idempotency key.
#[derive(Clone)]
pub struct HttpModelInvoker {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpModelInvoker {
    pub fn new(base_url: &str, timeout: Duration) -> TollgateResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("tollgate/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TollgateError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/v1/invoke", base_url.trim_end_matches('/')),
        })
    }
}

impl ModelInvoker for HttpModelInvoker {
    async fn invoke(
        &self,
        tenant_id: Uuid,
        request: &CompletionRequest,
        reservation: &Reservation,
    ) -> TollgateResult<CompletionResponse> {
        let body = InvokeBody {
            tenant_id,
            reservation_id: reservation.id,
            max_cost: reservation.estimated,
            request,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .header("Idempotency-Key", reservation.id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    %tenant_id,
                    reservation_id = %reservation.id,
                    error = %e,
                    "Model call failed"
                );
                TollgateError::Upstream(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                %tenant_id,
                reservation_id = %reservation.id,
                status = status.as_u16(),
                "Model service returned an error"
            );
            return Err(TollgateError::Upstream(format!("model service returned {status}")));
        }

        let completion = response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| TollgateError::Upstream(format!("malformed model response: {e}")))?;
        if completion.cost.is_negative() {
            return Err(TollgateError::Upstream("negative metered cost".into()));
        }
        debug!(
            %tenant_id,
            reservation_id = %reservation.id,
            cost = %completion.cost,
            tokens = completion.usage.total(),
            "Model call completed"
        );
        Ok(completion)
    }
}
