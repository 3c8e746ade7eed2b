//! Login, refresh, revocation and session listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tollgate_auth::{LoginInput, TokenPair};
use tollgate_core::error::TollgateError;
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::models::session::{ClientOrigin, Session};
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::ApiResult;
use crate::extract::{Caller, Origin};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    tokens: TokenPair,
    session_id: Uuid,
    /// Older sessions revoked to stay under the concurrent-session cap.
    evicted_sessions: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    /// Defaults to the caller's current session.
    #[serde(default)]
    session_id: Option<Uuid>,
}

/// A session as shown to its owner. The refresh-token id stays private.
#[derive(Debug, Serialize)]
pub struct SessionView {
    id: Uuid,
    scopes: Vec<String>,
    origin: ClientOrigin,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    current: bool,
}

impl SessionView {
    fn new(session: Session, current: Option<Uuid>) -> Self {
        Self {
            current: current == Some(session.id),
            id: session.id,
            scopes: session.scopes,
            origin: session.origin,
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            expires_at: session.expires_at,
        }
    }
}

pub async fn login<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    Origin(origin): Origin,
    Json(mut input): Json<LoginInput>,
) -> ApiResult<(StatusCode, Json<LoginResponse>)> {
    input.origin = origin;
    let issued = state.auth.login(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            tokens: issued.tokens,
            session_id: issued.session.id,
            evicted_sessions: issued.evicted,
        }),
    ))
}

pub async fn refresh<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    Origin(origin): Origin,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let tokens = state.auth.refresh(&body.refresh_token, origin).await?;
    Ok(Json(tokens))
}

/// Revoke the current session, or another session of the same account.
pub async fn revoke<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    caller: Caller,
    Json(body): Json<RevokeRequest>,
) -> ApiResult<StatusCode> {
    let ctx = &caller.context;
    match body.session_id {
        None => state.auth.logout(ctx).await?,
        Some(session_id) => {
            let sessions = state.auth.sessions();
            let owned = sessions
                .list_active(ctx.tenant_id, ctx.account_id)
                .await?
                .iter()
                .any(|s| s.id == session_id);
            if !owned {
                return Err(TollgateError::Forbidden.into());
            }
            sessions.revoke(ctx.tenant_id, session_id).await?;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Sign out everywhere except the current session.
pub async fn revoke_all<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    caller: Caller,
) -> ApiResult<Json<Value>> {
    let ctx = &caller.context;
    let revoked = state
        .auth
        .sessions()
        .revoke_all(ctx.tenant_id, ctx.account_id, ctx.session_id)
        .await?;
    Ok(Json(json!({ "revoked": revoked })))
}

pub async fn list<B: Backend, I: ModelInvoker + 'static>(
    State(state): State<Arc<AppState<B, I>>>,
    caller: Caller,
) -> ApiResult<Json<Vec<SessionView>>> {
    let ctx = &caller.context;
    let sessions = state
        .auth
        .sessions()
        .list_active(ctx.tenant_id, ctx.account_id)
        .await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionView::new(s, ctx.session_id))
            .collect(),
    ))
}
