//! HTTP routes.

mod accounts;
mod health;
mod sessions;
mod tenants;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use serde::{Deserialize, Serialize};
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::repository::{PaginatedResult, Pagination};

use crate::backend::Backend;
use crate::state::AppState;

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 500;

/// `?offset=&limit=` query parameters for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl ListParams {
    fn pagination(&self) -> Pagination {
        Pagination {
            offset: self.offset.unwrap_or(0),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

impl<T: Serialize> PaginatedResponse<T> {
    fn map<U>(page: PaginatedResult<U>, f: impl FnMut(U) -> T) -> Self {
        Self {
            data: page.items.into_iter().map(f).collect(),
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

impl<T: Serialize> From<PaginatedResult<T>> for PaginatedResponse<T> {
    fn from(page: PaginatedResult<T>) -> Self {
        Self::map(page, |item| item)
    }
}

pub fn router<B, I>(state: Arc<AppState<B, I>>) -> Router
where
    B: Backend,
    I: ModelInvoker + 'static,
{
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/v1/sessions",
            post(sessions::login::<B, I>).get(sessions::list::<B, I>),
        )
        .route("/v1/sessions/refresh", post(sessions::refresh::<B, I>))
        .route("/v1/sessions/revoke", post(sessions::revoke::<B, I>))
        .route("/v1/sessions/revoke-all", post(sessions::revoke_all::<B, I>))
        .route(
            "/v1/accounts/me/password",
            post(accounts::rotate_password::<B, I>),
        )
        .route("/v1/tenants/{tenant_id}", get(tenants::get_tenant::<B, I>))
        .route(
            "/v1/tenants/{tenant_id}/completions",
            post(tenants::create_completion::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/budget",
            get(tenants::get_budget::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/budget/spend",
            get(tenants::list_spend::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/budget/alerts",
            get(tenants::list_alerts::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/budget/alerts/{alert_id}/ack",
            post(tenants::acknowledge_alert::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/budget/reactivate",
            post(tenants::reactivate::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/cache",
            delete(tenants::purge_cache::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/cache/{key}",
            delete(tenants::purge_cache_key::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/audit",
            get(tenants::list_audit::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/accounts",
            post(accounts::register::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/api-keys",
            post(accounts::create_api_key::<B, I>).get(accounts::list_api_keys::<B, I>),
        )
        .route(
            "/v1/tenants/{tenant_id}/api-keys/{key_id}",
            delete(accounts::revoke_api_key::<B, I>),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(ListParams::default().pagination().limit, DEFAULT_LIMIT);
        let params = ListParams {
            offset: Some(10),
            limit: Some(10_000),
        };
        let pagination = params.pagination();
        assert_eq!(pagination.offset, 10);
        assert_eq!(pagination.limit, MAX_LIMIT);
    }
}
