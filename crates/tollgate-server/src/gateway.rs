//! The completion path: cache first, then reserve, invoke and commit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tollgate_auth::TenantScope;
use tollgate_budget::BudgetGovernor;
use tollgate_cache::{CacheLookup, ResponseCache, fingerprint, is_cacheable};
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::events::EventSink;
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::models::cache_entry::TokenUsage;
use tollgate_core::models::completion::CompletionRequest;
use tollgate_core::money::Money;
use tollgate_core::repository::{BudgetLedgerRepository, CacheRepository};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub payload: serde_json::Value,
    pub usage: TokenUsage,
    /// What this request was charged. Zero for cache hits.
    pub cost: Money,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<Uuid>,
}

pub struct CompletionGateway<C, L, E, I> {
    cache: ResponseCache<C>,
    governor: BudgetGovernor<L, E>,
    invoker: I,
}

impl<C, L, E, I> CompletionGateway<C, L, E, I>
where
    C: CacheRepository,
    L: BudgetLedgerRepository,
    E: EventSink,
    I: ModelInvoker,
{
    pub fn new(cache: ResponseCache<C>, governor: BudgetGovernor<L, E>, invoker: I) -> Self {
        Self {
            cache,
            governor,
            invoker,
        }
    }

    pub fn cache(&self) -> &ResponseCache<C> {
        &self.cache
    }

    pub fn governor(&self) -> &BudgetGovernor<L, E> {
        &self.governor
    }

    /// Serve one completion for an authorized caller.
    ///
    /// A cache hit is served even when the tenant is suspended, since it
    /// costs nothing. A paid call holds a reservation for its estimate
    /// until the metered cost is known.
    pub async fn complete(
        &self,
        scope: &TenantScope,
        request: CompletionRequest,
    ) -> TollgateResult<CompletionOutcome> {
        if request.model.trim().is_empty() {
            return Err(TollgateError::Validation {
                message: "model must not be empty".into(),
            });
        }
        let tenant_id = scope.tenant_id();
        let account_id = scope.account_id();
        let key = is_cacheable(&request, self.cache.config())
            .then(|| fingerprint(tenant_id, &request));

        let cached = match &key {
            Some(key) => self.cache.lookup(tenant_id, key).await,
            None => CacheLookup::Miss,
        };
        if let CacheLookup::Hit(entry) = cached {
            if let Err(e) = self
                .governor
                .record_cache_hit(tenant_id, account_id, Some(&entry.model))
                .await
            {
                warn!(%tenant_id, error = %e, "Failed to record cache-served request");
            }
            return Ok(CompletionOutcome {
                payload: entry.payload,
                usage: entry.usage,
                cost: Money::ZERO,
                cache_hit: true,
                cached_at: Some(entry.created_at),
                reservation_id: None,
            });
        }

        let reservation = self
            .governor
            .reserve(tenant_id, account_id, request.estimated_cost)
            .await?;
        let reservation_id = reservation.id;

        let response = match self.invoker.invoke(tenant_id, &request, &reservation).await {
            Ok(response) => response,
            Err(e) => {
                if let Err(release_err) = self.governor.release(reservation).await {
                    error!(
                        %tenant_id,
                        %reservation_id,
                        error = %release_err,
                        "Failed to release reservation after model failure"
                    );
                }
                return Err(e);
            }
        };

        // The response is returned even if the commit fails. A commit is
        // applied at most once per reservation, so one retry is safe.
        let model = Some(request.model.as_str());
        let committed = match self.governor.commit(&reservation, response.cost, model).await {
            Err(e) if e.is_retryable() => {
                warn!(
                    %tenant_id,
                    %reservation_id,
                    error = %e,
                    "Spend commit failed; retrying"
                );
                self.governor.commit(&reservation, response.cost, model).await
            }
            other => other,
        };
        if let Err(e) = committed {
            error!(
                %tenant_id,
                %reservation_id,
                cost = %response.cost,
                error = %e,
                "Spend commit did not complete; the estimate may stay reserved \
                 with no spend record until the period rolls over"
            );
        }

        if let Some(key) = key {
            self.cache
                .store(tenant_id, key, &request.model, &response, None)
                .await;
        }

        info!(
            %tenant_id,
            %account_id,
            %reservation_id,
            cost = %response.cost,
            "Paid completion served"
        );
        Ok(CompletionOutcome {
            payload: response.payload,
            usage: response.usage,
            cost: response.cost,
            cache_hit: false,
            cached_at: None,
            reservation_id: Some(reservation_id),
        })
    }
}
