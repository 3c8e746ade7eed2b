//! Tenant-scoped routes. Every handler authorizes the path tenant through
//! the guard before touching data.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::{Value, json};
use tollgate_budget::BudgetSnapshot;
use tollgate_core::deadline::with_deadline;
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::models::audit::AuditEvent;
use tollgate_core::models::budget::{BudgetAlert, SpendRecord};
use tollgate_core::models::cache_entry::CacheKey;
use tollgate_core::models::completion::CompletionRequest;
use tollgate_core::models::tenant::Tenant;
use tollgate_core::repository::{AuditEventFilter, AuditLogRepository};
use tollgate_core::scope;
use uuid::Uuid;

use super::{ListParams, PaginatedResponse};
use crate::backend::Backend;
use crate::error::ApiResult;
use crate::extract::Caller;
use crate::gateway::CompletionOutcome;
use crate::state::AppState;

type SharedState<B, I> = State<Arc<AppState<B, I>>>;

pub async fn get_tenant<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path(tenant_id): Path<Uuid>,
    caller: Caller,
) -> ApiResult<Json<Tenant>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_READ, tenant_id, &caller.origin)
        .await?;
    let tenant = state.auth.directory().get(scoped.tenant_id()).await?;
    Ok(Json(tenant))
}

pub async fn create_completion<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path(tenant_id): Path<Uuid>,
    caller: Caller,
    Json(request): Json<CompletionRequest>,
) -> ApiResult<Json<CompletionOutcome>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::COMPLETIONS_CREATE, tenant_id, &caller.origin)
        .await?;
    let outcome = state.gateway.complete(&scoped, request).await?;
    Ok(Json(outcome))
}

pub async fn get_budget<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path(tenant_id): Path<Uuid>,
    caller: Caller,
) -> ApiResult<Json<BudgetSnapshot>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::BUDGET_READ, tenant_id, &caller.origin)
        .await?;
    let snapshot = state.gateway.governor().snapshot(scoped.tenant_id()).await?;
    Ok(Json(snapshot))
}

pub async fn list_spend<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<ListParams>,
    caller: Caller,
) -> ApiResult<Json<PaginatedResponse<SpendRecord>>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::BUDGET_READ, tenant_id, &caller.origin)
        .await?;
    let page = state
        .gateway
        .governor()
        .list_spend(scoped.tenant_id(), params.pagination())
        .await?;
    Ok(Json(page.into()))
}

pub async fn list_alerts<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<ListParams>,
    caller: Caller,
) -> ApiResult<Json<PaginatedResponse<BudgetAlert>>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::BUDGET_READ, tenant_id, &caller.origin)
        .await?;
    let page = state
        .gateway
        .governor()
        .list_alerts(scoped.tenant_id(), params.pagination())
        .await?;
    Ok(Json(page.into()))
}

pub async fn acknowledge_alert<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path((tenant_id, alert_id)): Path<(Uuid, Uuid)>,
    caller: Caller,
) -> ApiResult<Json<BudgetAlert>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_WRITE, tenant_id, &caller.origin)
        .await?;
    let alert = state
        .gateway
        .governor()
        .acknowledge_alert(scoped.tenant_id(), alert_id)
        .await?;
    Ok(Json(alert))
}

pub async fn reactivate<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path(tenant_id): Path<Uuid>,
    caller: Caller,
) -> ApiResult<Json<BudgetSnapshot>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_WRITE, tenant_id, &caller.origin)
        .await?;
    let snapshot = state
        .gateway
        .governor()
        .reactivate(scoped.tenant_id())
        .await?;
    Ok(Json(snapshot))
}

pub async fn purge_cache<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path(tenant_id): Path<Uuid>,
    caller: Caller,
) -> ApiResult<Json<Value>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_WRITE, tenant_id, &caller.origin)
        .await?;
    let removed = state.gateway.cache().purge(scoped.tenant_id()).await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn purge_cache_key<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path((tenant_id, key)): Path<(Uuid, String)>,
    caller: Caller,
) -> ApiResult<Json<Value>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_WRITE, tenant_id, &caller.origin)
        .await?;
    let removed = state
        .gateway
        .cache()
        .purge_key(scoped.tenant_id(), &CacheKey::new(key))
        .await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn list_audit<B: Backend, I: ModelInvoker + 'static>(
    State(state): SharedState<B, I>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<ListParams>,
    caller: Caller,
) -> ApiResult<Json<PaginatedResponse<AuditEvent>>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_READ, tenant_id, &caller.origin)
        .await?;
    let page = with_deadline(
        "audit.list",
        state.store_timeout,
        state.audit.list(
            scoped.tenant_id(),
            AuditEventFilter::default(),
            params.pagination(),
        ),
    )
    .await?;
    Ok(Json(page.into()))
}
