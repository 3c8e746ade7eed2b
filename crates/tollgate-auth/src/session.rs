//! Session lifecycle: issuance with a concurrent-session cap, refresh
//! rotation with replay and origin checks, stateless access-token
//! validation, and revocation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tollgate_core::deadline::with_deadline;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::events::{ControlPlaneEvent, EventSink};
use tollgate_core::models::account::Account;
use tollgate_core::models::audit::{AuditEventKind, CreateAuditEvent};
use tollgate_core::models::auth_context::AuthContext;
use tollgate_core::models::session::{
    ClientOrigin, CreateSession, RevocationReason, RotateRefreshToken, Session,
};
use tollgate_core::models::tenant::Tenant;
use tollgate_core::repository::SessionRepository;
use tollgate_core::scope;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::token::{self, JwtKeys};

/// A signed access/refresh token pair handed back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub tokens: TokenPair,
    pub session: Session,
    /// Sessions revoked to stay within the concurrent-session limit.
    pub evicted: Vec<Uuid>,
}

pub struct SessionManager<S, E> {
    sessions: S,
    keys: JwtKeys,
    events: Arc<E>,
    config: AuthConfig,
}

impl<S: SessionRepository, E: EventSink> SessionManager<S, E> {
    pub fn new(sessions: S, keys: JwtKeys, events: Arc<E>, config: AuthConfig) -> Self {
        Self {
            sessions,
            keys,
            events,
            config,
        }
    }

    fn refresh_lifetime(&self) -> Duration {
        Duration::seconds(self.config.refresh_token_lifetime_secs as i64)
    }

    fn token_pair(&self, session: &Session, refresh_token_id: &str) -> TollgateResult<TokenPair> {
        let access_token = self.keys.issue_access_token(
            session.account_id,
            session.tenant_id,
            session.id,
            &session.scopes,
        )?;
        let refresh_token = self.keys.issue_refresh_token(
            session.account_id,
            session.tenant_id,
            session.id,
            refresh_token_id,
            session.expires_at,
        )?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.keys.access_lifetime_secs(),
        })
    }

    async fn security_event(&self, session: &Session, kind: AuditEventKind, origin: &ClientOrigin) {
        self.events
            .emit(ControlPlaneEvent::Security(
                CreateAuditEvent::new(session.tenant_id, kind)
                    .actor(session.account_id)
                    .session(session.id)
                    .origin(origin.clone()),
            ))
            .await;
    }

    /// Open a session for an authenticated account.
    ///
    /// Granted scopes are the account's scopes narrowed to what the tenant
    /// allows. When the account is already at its session limit, the
    /// least recently active sessions are revoked first.
    pub async fn issue(
        &self,
        account: &Account,
        tenant: &Tenant,
        origin: ClientOrigin,
    ) -> TollgateResult<IssuedSession> {
        if account.tenant_id != tenant.id {
            return Err(TollgateError::Forbidden);
        }
        let timeout = self.config.store_timeout();
        let now = Utc::now();

        // 1. Make room under the concurrent-session cap.
        let active = with_deadline(
            "session.list_active",
            timeout,
            self.sessions.list_active(tenant.id, account.id, now),
        )
        .await?;
        let keep = self.config.max_concurrent_sessions.saturating_sub(1);
        let excess = active.len().saturating_sub(keep);
        let mut evicted = Vec::with_capacity(excess);
        for stale in active.iter().take(excess) {
            let revoked = with_deadline(
                "session.revoke",
                timeout,
                self.sessions
                    .revoke(tenant.id, stale.id, RevocationReason::Evicted),
            )
            .await?;
            if revoked {
                info!(
                    tenant_id = %tenant.id,
                    account_id = %account.id,
                    session_id = %stale.id,
                    "Session evicted to honour concurrent-session limit"
                );
                self.security_event(stale, AuditEventKind::SessionEvicted, &origin)
                    .await;
                evicted.push(stale.id);
            }
        }

        // 2. Persist the session with a hashed refresh-token id.
        let refresh_token_id = token::generate_token_id();
        let session = with_deadline(
            "session.create",
            timeout,
            self.sessions.create(CreateSession {
                id: Uuid::new_v4(),
                tenant_id: tenant.id,
                account_id: account.id,
                scopes: scope::intersect(&account.scopes, &tenant.allowed_scopes),
                refresh_token_id: token::hash_token_id(&refresh_token_id),
                origin,
                expires_at: now + self.refresh_lifetime(),
            }),
        )
        .await?;

        // 3. Sign the pair.
        let tokens = self.token_pair(&session, &refresh_token_id)?;
        debug!(tenant_id = %session.tenant_id, session_id = %session.id, "Session issued");

        Ok(IssuedSession {
            tokens,
            session,
            evicted,
        })
    }

    /// Redeem a refresh token for a new pair. The presented token becomes
    /// permanently invalid.
    ///
    /// A store timeout fails closed: nothing is rotated and the caller may
    /// retry with the same token.
    pub async fn refresh(
        &self,
        presented: &str,
        origin: ClientOrigin,
    ) -> TollgateResult<TokenPair> {
        self.redeem(presented, origin).await.map_err(|e| match e {
            TollgateError::StoreTimeout { operation } => TollgateError::ServiceUnavailable(
                format!("{operation} timed out; retry with the same refresh token"),
            ),
            other => other,
        })
    }

    async fn redeem(&self, presented: &str, origin: ClientOrigin) -> TollgateResult<TokenPair> {
        let timeout = self.config.store_timeout();

        // 1. Signature, expiry, issuer.
        let claims = self.keys.decode_refresh_token(presented)?;
        let (tenant_id, session_id, account_id) = claims.ids()?;

        // 2. Load the session named by the token.
        let session = with_deadline(
            "session.get",
            timeout,
            self.sessions.get_by_id(tenant_id, session_id),
        )
        .await
        .map_err(|e| match e {
            TollgateError::NotFound { .. } => TollgateError::invalid_token("unknown session"),
            other => other,
        })?;
        if session.account_id != account_id {
            return Err(TollgateError::invalid_token("session does not match token"));
        }
        if session.revoked {
            return Err(TollgateError::SessionRevoked);
        }
        let now = Utc::now();
        if session.expires_at <= now {
            return Err(TollgateError::invalid_token("session expired"));
        }

        // 3. An authentic token that is no longer current is a replay.
        let presented_hash = token::hash_token_id(&claims.rti);
        if presented_hash != session.refresh_token_id {
            return Err(self.replay_detected(&session, &origin).await);
        }

        // 4. Origin check.
        if session.origin.differs_materially(&origin) {
            let revoked = with_deadline(
                "session.revoke",
                timeout,
                self.sessions
                    .revoke(tenant_id, session_id, RevocationReason::SuspiciousOrigin),
            )
            .await?;
            if !revoked {
                debug!(
                    tenant_id = %tenant_id,
                    session_id = %session_id,
                    "Session already revoked by a concurrent request"
                );
            }
            warn!(
                tenant_id = %tenant_id,
                session_id = %session_id,
                previous_ip = ?session.origin.ip_address,
                presented_ip = ?origin.ip_address,
                presented_user_agent = ?origin.user_agent,
                "Refresh from unfamiliar origin; session revoked"
            );
            self.security_event(&session, AuditEventKind::SuspiciousOrigin, &origin)
                .await;
            return Err(TollgateError::SessionRevoked);
        }

        // 5. Compare-and-swap the refresh-token id.
        let next_token_id = token::generate_token_id();
        let rotated = with_deadline(
            "session.rotate",
            timeout,
            self.sessions.rotate_refresh_token(
                tenant_id,
                session_id,
                RotateRefreshToken {
                    expected_token_id: presented_hash,
                    new_token_id: token::hash_token_id(&next_token_id),
                    origin: session.origin.merged_with(&origin),
                    expires_at: now + self.refresh_lifetime(),
                    now,
                },
            ),
        )
        .await?;

        match rotated {
            Some(session) => {
                debug!(tenant_id = %tenant_id, session_id = %session_id, "Refresh token rotated");
                self.token_pair(&session, &next_token_id)
            }
            // Another redemption of the same token won the swap.
            None => Err(self.replay_detected(&session, &origin).await),
        }
    }

    async fn replay_detected(&self, session: &Session, origin: &ClientOrigin) -> TollgateError {
        if let Err(e) = with_deadline(
            "session.revoke",
            self.config.store_timeout(),
            self.sessions
                .revoke(session.tenant_id, session.id, RevocationReason::ReplayDetected),
        )
        .await
        {
            return e;
        }
        warn!(
            tenant_id = %session.tenant_id,
            account_id = %session.account_id,
            session_id = %session.id,
            "Refresh token replay detected; session revoked"
        );
        self.security_event(session, AuditEventKind::RefreshReplay, origin)
            .await;
        TollgateError::invalid_token("refresh token already used")
    }

    /// Verify an access token's signature, expiry and issuer. No store
    /// lookup: revocation takes effect when the access token expires.
    pub fn validate(&self, access_token: &str) -> TollgateResult<AuthContext> {
        let claims = self.keys.decode_access_token(access_token)?;
        Ok(claims.to_auth_context()?)
    }

    pub async fn revoke(&self, tenant_id: Uuid, session_id: Uuid) -> TollgateResult<bool> {
        let revoked = with_deadline(
            "session.revoke",
            self.config.store_timeout(),
            self.sessions
                .revoke(tenant_id, session_id, RevocationReason::Logout),
        )
        .await?;
        if revoked {
            info!(tenant_id = %tenant_id, session_id = %session_id, "Session revoked");
        }
        Ok(revoked)
    }

    /// Revoke every session of an account, optionally keeping one.
    pub async fn revoke_all(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        except: Option<Uuid>,
    ) -> TollgateResult<u64> {
        let count = with_deadline(
            "session.revoke_all",
            self.config.store_timeout(),
            self.sessions.revoke_account_sessions(
                tenant_id,
                account_id,
                except,
                RevocationReason::SignOutEverywhere,
            ),
        )
        .await?;
        info!(tenant_id = %tenant_id, account_id = %account_id, count, "Sessions revoked");
        Ok(count)
    }

    pub async fn list_active(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> TollgateResult<Vec<Session>> {
        with_deadline(
            "session.list_active",
            self.config.store_timeout(),
            self.sessions.list_active(tenant_id, account_id, Utc::now()),
        )
        .await
    }

    pub async fn cleanup_expired(&self, tenant_id: Uuid) -> TollgateResult<u64> {
        with_deadline(
            "session.cleanup_expired",
            self.config.store_timeout(),
            self.sessions.cleanup_expired(tenant_id, Utc::now()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::events::ChannelEventSink;
    use tollgate_core::models::account::{AccountKind, AccountStatus};
    use tollgate_core::models::tenant::TenantStatus;
    use tollgate_core::money::Money;
    use tollgate_db::MemoryStore;

    use crate::token::test_keys;

    fn tenant() -> Tenant {
        let now = Utc::now();
        Tenant {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            slug: "acme".into(),
            allowed_scopes: vec![scope::CONVERSATIONS_READ.into()],
            budget_limit: Money::from_units(100),
            committed_spend: Money::ZERO,
            reserved_spend: Money::ZERO,
            period_start: now,
            status: TenantStatus::Active,
            alert_level: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn account(tenant_id: Uuid) -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            tenant_id,
            username: "ada".into(),
            email: "ada@example.com".into(),
            credential_hash: String::new(),
            kind: AccountKind::Human,
            status: AccountStatus::Active,
            scopes: vec![
                scope::CONVERSATIONS_READ.into(),
                scope::ADMIN_WRITE.into(),
            ],
            failed_login_attempts: 0,
            lockout_count: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn manager() -> SessionManager<MemoryStore, ChannelEventSink> {
        let config = test_keys::config();
        let keys = JwtKeys::from_config(&config).unwrap();
        let (sink, _rx) = ChannelEventSink::new();
        SessionManager::new(MemoryStore::new(), keys, Arc::new(sink), config)
    }

    #[tokio::test]
    async fn issued_scopes_are_narrowed_to_tenant() {
        let mgr = manager();
        let tenant = tenant();
        let account = account(tenant.id);
        let issued = mgr
            .issue(&account, &tenant, ClientOrigin::new("10.0.0.1", "cli/1.0"))
            .await
            .unwrap();
        assert_eq!(issued.session.scopes, vec![scope::CONVERSATIONS_READ]);

        let ctx = mgr.validate(&issued.tokens.access_token).unwrap();
        assert_eq!(ctx.tenant_id, tenant.id);
        assert_eq!(ctx.session_id, Some(issued.session.id));
        assert!(!ctx.has_scope(scope::ADMIN_WRITE));
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let mgr = manager();
        let tenant = tenant();
        let issued = mgr
            .issue(&account(tenant.id), &tenant, ClientOrigin::default())
            .await
            .unwrap();
        assert!(mgr.validate(&issued.tokens.refresh_token).is_err());
    }

    #[tokio::test]
    async fn account_from_other_tenant_is_refused() {
        let mgr = manager();
        let tenant = tenant();
        let stranger = account(Uuid::new_v4());
        let err = mgr
            .issue(&stranger, &tenant, ClientOrigin::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::Forbidden));
    }
}
