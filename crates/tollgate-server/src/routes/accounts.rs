//! Account registration, password rotation and API key management.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tollgate_auth::RegisterInput;
use tollgate_core::error::TollgateError;
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::models::account::{Account, AccountKind, AccountStatus};
use tollgate_core::models::api_key::ApiKey;
use tollgate_core::scope;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::ApiResult;
use crate::extract::Caller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    kind: Option<AccountKind>,
    #[serde(default)]
    scopes: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    id: Uuid,
    tenant_id: Uuid,
    username: String,
    email: String,
    kind: AccountKind,
    status: AccountStatus,
    scopes: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            tenant_id: account.tenant_id,
            username: account.username,
            email: account.email,
            kind: account.kind,
            status: account.status,
            scopes: account.scopes,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RotatePasswordRequest {
    current_password: String,
    new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    name: String,
    /// Defaults to every scope the caller holds.
    #[serde(default)]
    scopes: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyView {
    id: Uuid,
    name: String,
    prefix: String,
    scopes: Vec<String>,
    revoked: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyView {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            prefix: key.prefix,
            scopes: key.scopes,
            revoked: key.revoked,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedApiKey {
    /// Shown once; only its hash is kept.
    key: String,
    #[serde(flatten)]
    api_key: ApiKeyView,
}

pub async fn register<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    Path(tenant_id): Path<Uuid>,
    caller: Caller,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AccountView>)> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_WRITE, tenant_id, &caller.origin)
        .await?;
    let account = state
        .auth
        .register(RegisterInput {
            tenant_id: scoped.tenant_id(),
            username: body.username,
            email: body.email,
            password: body.password,
            kind: body.kind.unwrap_or(AccountKind::Human),
            scopes: body.scopes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// Change the caller's password and sign out every other session.
pub async fn rotate_password<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    caller: Caller,
    Json(body): Json<RotatePasswordRequest>,
) -> ApiResult<Json<Value>> {
    let revoked = state
        .auth
        .rotate_password(&caller.context, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(json!({ "revoked_sessions": revoked })))
}

pub async fn create_api_key<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    Path(tenant_id): Path<Uuid>,
    caller: Caller,
    Json(body): Json<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreatedApiKey>)> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_WRITE, tenant_id, &caller.origin)
        .await?;
    // Keys are minted from interactive sessions only.
    if scoped.context().session_id.is_none() {
        return Err(TollgateError::Forbidden.into());
    }
    if body.name.trim().is_empty() {
        return Err(TollgateError::Validation {
            message: "name must not be empty".into(),
        }
        .into());
    }
    let scopes = body
        .scopes
        .unwrap_or_else(|| scoped.context().scopes.iter().cloned().collect());
    let (key, raw) = state
        .auth
        .credentials()
        .create_api_key(scoped.tenant_id(), scoped.account_id(), body.name, scopes)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKey {
            key: raw,
            api_key: key.into(),
        }),
    ))
}

pub async fn list_api_keys<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    Path(tenant_id): Path<Uuid>,
    caller: Caller,
) -> ApiResult<Json<Vec<ApiKeyView>>> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_READ, tenant_id, &caller.origin)
        .await?;
    let keys = state
        .auth
        .credentials()
        .list_api_keys(scoped.tenant_id(), scoped.account_id())
        .await?;
    Ok(Json(keys.into_iter().map(ApiKeyView::from).collect()))
}

pub async fn revoke_api_key<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    Path((tenant_id, key_id)): Path<(Uuid, Uuid)>,
    caller: Caller,
) -> ApiResult<StatusCode> {
    let scoped = state
        .guard
        .authorize(&caller.context, scope::ADMIN_WRITE, tenant_id, &caller.origin)
        .await?;
    state
        .auth
        .credentials()
        .revoke_api_key(scoped.tenant_id(), key_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
